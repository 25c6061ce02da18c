pub mod assistant;
pub mod llm;
pub mod tools;

pub use assistant::{Assistant, AssistantRegistry, AssistantResolver};

pub use llm::{
    BoxedModelStream, CompletionRequest, ModelError, ModelEvent, ModelResult, ModelStream,
    ModelStreamFactory, OpenAIChatConfig, OpenAIChatFactory, Role,
};

pub use tools::{
    SharedToolExecutor, ToolCall, ToolContext, ToolError, ToolExecutor, ToolExecutorFactory,
    ToolManifest, WebhookToolExecutorFactory,
};
