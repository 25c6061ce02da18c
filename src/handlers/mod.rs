//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `assistants` - Assistant listing and lookup
//! - `relay` - Conversation relay WebSocket for voice calls
//! - `twiml` - Call-initiation markup pointing calls at the relay

pub mod api;
pub mod assistants;
pub mod relay;
pub mod twiml;

// Re-export commonly used handlers for convenient access
pub use relay::relay_handler;
