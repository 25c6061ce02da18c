//! Base traits and types for tool execution.
//!
//! A tool call is requested by the model stream, executed by a [`ToolExecutor`]
//! on its own task, and its result is fed back into the conversation as a
//! `tool` turn. The executor never touches session state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::assistant::Assistant;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while executing a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No executor endpoint is configured for this deployment
    #[error("Tool execution is not configured")]
    NotConfigured,

    /// The model asked for a tool that is not in the session's manifest
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The tool ran but failed
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// The tool did not answer in time
    #[error("Tool execution timed out: {0}")]
    Timeout(String),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

// =============================================================================
// Call Types
// =============================================================================

/// A tool invocation requested by the model stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the model; unique among pending calls of a session
    pub id: String,
    /// Tool name as declared in the manifest
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Call-level facts handed to the executor alongside each tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub call_sid: String,
    /// Caller phone number from the setup frame
    pub from: Option<String>,
    pub assistant_name: String,
}

// =============================================================================
// Executor Traits
// =============================================================================

/// Executes tool calls on behalf of a session.
///
/// Implementations are shared across the concurrent executions of one session,
/// so `run` takes `&self`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a tool call and return its result payload (usually JSON text).
    async fn run(&self, context: &ToolContext, call: &ToolCall) -> ToolResult<String>;
}

/// Shared trait object for tool executors.
pub type SharedToolExecutor = Arc<dyn ToolExecutor>;

/// Creates the executor used by one session.
pub trait ToolExecutorFactory: Send + Sync {
    fn create(&self, assistant: &Assistant) -> SharedToolExecutor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ToolError::NotConfigured.to_string(),
            "Tool execution is not configured"
        );
        assert_eq!(
            ToolError::UnknownTool("launch-rocket".into()).to_string(),
            "Unknown tool: launch-rocket"
        );
    }

    #[test]
    fn test_tool_call_new() {
        let call = ToolCall::new("call_1", "get-customer", r#"{"from":"+61400000000"}"#);
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "get-customer");
        assert!(call.arguments.contains("+61400000000"));
    }
}
