//! Base traits and types for streaming language-model providers.
//!
//! A [`ModelStream`] owns one conversation's history on the provider side.
//! Callers push context and completion requests into it; output comes back
//! asynchronously as [`ModelEvent`]s on the channel the stream was created with.
//! Nothing in this interface blocks the caller on network I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::assistant::Assistant;
use crate::core::tools::ToolCall;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to a model provider.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Request could not be sent or the stream broke
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Provider answered with an error
    #[error("Provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The stream was destroyed
    #[error("Model stream closed")]
    Closed,
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

// =============================================================================
// Conversation Types
// =============================================================================

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A turn that asks the model to continue the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub role: Role,
    pub content: String,
    /// Interaction number the resulting events are tagged with
    pub interaction: u64,
    /// Set for `tool` turns; references the originating tool call
    pub tool_call_id: Option<String>,
}

impl CompletionRequest {
    /// Caller utterance.
    pub fn user(content: impl Into<String>, interaction: u64) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            interaction,
            tool_call_id: None,
        }
    }

    /// Result of a tool call.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        interaction: u64,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            interaction,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Output of a model stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// Partial response text
    Token { text: String, interaction: u64 },
    /// End of a spoken model turn
    Complete { interaction: u64 },
    /// The model wants a tool run
    ToolRequest(ToolCall),
    /// A request failed; the conversation can continue
    Failed { message: String, interaction: u64 },
}

// =============================================================================
// Stream Traits
// =============================================================================

/// One conversation with a streaming model.
///
/// All methods return immediately; provider I/O happens on tasks owned by the
/// implementation and surfaces through [`ModelEvent`]s.
pub trait ModelStream: Send + Sync {
    /// Append context without asking for a response.
    fn add_context(&mut self, text: &str, role: Role);

    /// Append a turn and ask the model to respond.
    fn completion(&mut self, request: CompletionRequest) -> ModelResult<()>;

    /// Cancel in-flight work and release provider resources. Idempotent.
    fn destroy(&mut self);
}

/// Boxed trait object for model streams.
pub type BoxedModelStream = Box<dyn ModelStream>;

/// Creates the model stream for a new session.
pub trait ModelStreamFactory: Send + Sync {
    fn create(
        &self,
        call_sid: &str,
        assistant: &Assistant,
        events: mpsc::Sender<ModelEvent>,
    ) -> ModelResult<BoxedModelStream>;
}
