//! OpenAI-compatible chat completions backend.
//!
//! Streams responses over SSE and supports function tools. Any server that
//! implements `POST /chat/completions` with `stream: true` works by pointing
//! `base_url` at it.

mod client;
mod config;
mod messages;

pub use client::{OpenAIChatFactory, OpenAIChatStream};
pub use config::{
    OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL, OPENAI_DEFAULT_REQUEST_TIMEOUT,
    OpenAIChatConfig,
};
pub use messages::{ChatMessage, ChatTool, tools_from_manifest};
