//! Conversation relay WebSocket handlers
//!
//! Bridges a telephony voice gateway (ConversationRelay) to a streaming
//! language model for the lifetime of one call.
//!
//! # Protocol
//!
//! ## Gateway → Server
//!
//! - **setup**: Call metadata; `customParameters.assistant` selects the assistant
//! - **prompt**: Transcribed caller speech (`voicePrompt`)
//! - **info**: Gateway status, logged only
//! - **interrupt**: Caller barged in over playback
//! - **dtmf**: Keypad digit
//!
//! ## Server → Gateway
//!
//! - **text**: Tokens to speak; `last: true` ends the turn
//! - **end**: Hang up, with `handoffData` describing why
//!
//! # Components
//!
//! - [`session::SessionController`]: per-call state machine
//! - [`processor`]: frame parsing and routing
//! - [`silence::SilenceMonitor`]: reminders and silence hang-up
//! - [`tool_bridge::ToolDispatchBridge`]: tool execution and result correlation

mod handler;
pub mod messages;
pub mod processor;
pub mod session;
pub mod silence;
pub mod tool_bridge;

pub use handler::relay_handler;
pub use messages::{InboundFrame, OutboundFrame, RelayRoute};
pub use session::{CloseReason, SessionController, SessionServices, SessionState};
pub use silence::{SilenceConfig, SilenceMonitor};
pub use tool_bridge::ToolDispatchBridge;
