//! Language-model stream module.
//!
//! - `ModelStream` trait: one conversation, non-blocking, events over a channel
//! - `ModelStreamFactory` trait: creates a stream per session
//! - OpenAI-compatible implementation over SSE

mod base;
pub mod openai;
pub mod sse;

pub use base::{
    BoxedModelStream, CompletionRequest, ModelError, ModelEvent, ModelResult, ModelStream,
    ModelStreamFactory, Role,
};
pub use openai::{OpenAIChatConfig, OpenAIChatFactory, OpenAIChatStream};
