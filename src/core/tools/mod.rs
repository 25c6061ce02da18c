//! Tool execution module.
//!
//! - `ToolExecutor` trait for running a model-requested tool call
//! - `ToolManifest` describing the tools offered to the model
//! - A webhook executor that forwards calls to an HTTP endpoint

mod base;
pub mod manifest;
pub mod webhook;

pub use base::{
    SharedToolExecutor, ToolCall, ToolContext, ToolError, ToolExecutor, ToolExecutorFactory,
    ToolResult,
};
pub use manifest::{ParameterSpec, ToolDescriptor, ToolManifest, ToolParameters};
pub use webhook::{
    DEFAULT_TOOL_TIMEOUT, UnconfiguredToolExecutor, WebhookToolExecutor,
    WebhookToolExecutorFactory,
};
