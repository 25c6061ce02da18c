//! Streaming chat completions client.
//!
//! Each session gets one [`OpenAIChatStream`]. The stream's public methods only
//! enqueue commands; a worker task owns the conversation history and issues
//! the HTTP requests one at a time, so tokens of consecutive turns never
//! interleave.

use futures::StreamExt;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::OpenAIChatConfig;
use super::messages::{
    ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChatTool, ErrorResponse,
    ToolCallAccumulator, tools_from_manifest,
};
use crate::core::assistant::Assistant;
use crate::core::llm::base::{
    BoxedModelStream, CompletionRequest, ModelError, ModelEvent, ModelResult, ModelStream,
    ModelStreamFactory, Role,
};
use crate::core::llm::sse;
use crate::core::tools::ToolCall;

enum WorkerCommand {
    AddContext(ChatMessage),
    Complete { message: ChatMessage, interaction: u64 },
}

// =============================================================================
// Stream Handle
// =============================================================================

/// Session-side handle of a chat completions conversation.
pub struct OpenAIChatStream {
    call_sid: String,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    cancel: CancellationToken,
    destroyed: bool,
}

impl OpenAIChatStream {
    /// Start the worker task for one conversation.
    pub fn spawn(
        client: reqwest::Client,
        config: OpenAIChatConfig,
        call_sid: &str,
        system_prompt: Option<&str>,
        tools: Vec<ChatTool>,
        events: mpsc::Sender<ModelEvent>,
    ) -> ModelResult<Self> {
        config.validate()?;

        let mut history = Vec::new();
        if let Some(prompt) = system_prompt
            && !prompt.trim().is_empty()
        {
            history.push(ChatMessage::text(Role::System, prompt));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = ChatWorker {
            client,
            config,
            call_sid: call_sid.to_string(),
            tools,
            history,
            outstanding: HashSet::new(),
            deferred: Vec::new(),
            events,
        };
        tokio::spawn(worker.run(commands_rx, cancel.clone()));

        Ok(Self {
            call_sid: call_sid.to_string(),
            commands: commands_tx,
            cancel,
            destroyed: false,
        })
    }
}

impl ModelStream for OpenAIChatStream {
    fn add_context(&mut self, text: &str, role: Role) {
        if self.destroyed {
            debug!(call_sid = %self.call_sid, "Ignoring context for destroyed model stream");
            return;
        }
        let _ = self
            .commands
            .send(WorkerCommand::AddContext(ChatMessage::text(role, text)));
    }

    fn completion(&mut self, request: CompletionRequest) -> ModelResult<()> {
        if self.destroyed {
            return Err(ModelError::Closed);
        }

        let message = match request.tool_call_id {
            Some(tool_call_id) => ChatMessage::tool(tool_call_id, request.content),
            None => ChatMessage::text(request.role, request.content),
        };

        self.commands
            .send(WorkerCommand::Complete {
                message,
                interaction: request.interaction,
            })
            .map_err(|_| ModelError::Closed)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.cancel.cancel();
        debug!(call_sid = %self.call_sid, "Model stream destroyed");
    }
}

impl Drop for OpenAIChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct ChatWorker {
    client: reqwest::Client,
    config: OpenAIChatConfig,
    call_sid: String,
    tools: Vec<ChatTool>,
    history: Vec<ChatMessage>,
    /// Tool call ids of the last assistant message still waiting for a result
    outstanding: HashSet<String>,
    /// Turns that arrived while tool results were outstanding
    deferred: Vec<ChatMessage>,
    events: mpsc::Sender<ModelEvent>,
}

impl ChatWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                WorkerCommand::AddContext(message) => {
                    if self.outstanding.is_empty() {
                        self.history.push(message);
                    } else {
                        self.deferred.push(message);
                    }
                }
                WorkerCommand::Complete {
                    message,
                    interaction,
                } => {
                    if !self.accept(message) {
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.respond(interaction) => {}
                    }
                }
            }
        }

        debug!(call_sid = %self.call_sid, "Chat worker stopped");
    }

    /// Append a completion turn. Returns whether a request can be issued now.
    fn accept(&mut self, message: ChatMessage) -> bool {
        match message.tool_call_id.clone() {
            Some(tool_call_id) => {
                if !self.outstanding.remove(&tool_call_id) {
                    warn!(
                        call_sid = %self.call_sid,
                        tool_call_id = %tool_call_id,
                        "Dropping result for a tool call that is not outstanding"
                    );
                    return false;
                }
                self.history.push(message);
            }
            None if !self.outstanding.is_empty() => {
                debug!(
                    call_sid = %self.call_sid,
                    outstanding = self.outstanding.len(),
                    "Deferring turn until tool results arrive"
                );
                self.deferred.push(message);
                return false;
            }
            None => self.history.push(message),
        }

        if !self.outstanding.is_empty() {
            debug!(
                call_sid = %self.call_sid,
                outstanding = self.outstanding.len(),
                "Waiting for remaining tool results"
            );
            return false;
        }

        self.history.append(&mut self.deferred);
        true
    }

    async fn respond(&mut self, interaction: u64) {
        match self.stream_response(interaction).await {
            Ok(()) => {}
            Err(ModelError::Closed) => {
                debug!(call_sid = %self.call_sid, "Event receiver gone, dropping response");
            }
            Err(e) => {
                error!(call_sid = %self.call_sid, interaction, error = %e, "Chat completion failed");
                let _ = self
                    .events
                    .send(ModelEvent::Failed {
                        message: e.to_string(),
                        interaction,
                    })
                    .await;
            }
        }
    }

    async fn stream_response(&mut self, interaction: u64) -> ModelResult<()> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: &self.history,
            stream: true,
            tools: &self.tools,
            temperature: self.config.temperature,
        };

        debug!(
            call_sid = %self.call_sid,
            interaction,
            messages = self.history.len(),
            "Requesting chat completion"
        );

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ModelError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }

        let mut text = String::new();
        let mut tool_calls = ToolCallAccumulator::default();
        let outcome = self
            .read_stream(response, interaction, &mut text, &mut tool_calls)
            .await;

        // Whatever was spoken stays in the history, even if the stream broke
        let spoken = (!text.is_empty()).then_some(text);
        let calls = if outcome.is_ok() {
            tool_calls.finish()
        } else {
            Vec::new()
        };

        if spoken.is_none() && calls.is_empty() {
            if outcome.is_ok() {
                warn!(call_sid = %self.call_sid, interaction, "Model returned an empty response");
            }
            return outcome;
        }

        let finished_turn = spoken.is_some();
        self.history
            .push(ChatMessage::assistant(spoken, calls.clone()));

        if finished_turn {
            self.emit(ModelEvent::Complete { interaction }).await?;
        }

        outcome?;

        for call in &calls {
            self.outstanding.insert(call.id.clone());
        }
        for call in &calls {
            info!(
                call_sid = %self.call_sid,
                tool_call_id = %call.id,
                tool_name = %call.function.name,
                "Model requested tool call"
            );
            self.emit(ModelEvent::ToolRequest(ToolCall::from(call)))
                .await?;
        }

        Ok(())
    }

    async fn read_stream(
        &self,
        response: reqwest::Response,
        interaction: u64,
        text: &mut String,
        tool_calls: &mut ToolCallAccumulator,
    ) -> ModelResult<()> {
        let mut lines = std::pin::pin!(sse::data_lines(Box::pin(response.bytes_stream())));

        while let Some(data) = lines.next().await {
            let data = data?;
            let chunk: ChatCompletionChunk = serde_json::from_str(&data).map_err(|e| {
                ModelError::SerializationError(format!("Malformed stream chunk: {e}"))
            })?;

            if let Some(error) = chunk.error {
                return Err(ModelError::ProviderError {
                    status: 200,
                    message: error.message,
                });
            }

            for choice in chunk.choices {
                if let Some(content) = choice.delta.content
                    && !content.is_empty()
                {
                    text.push_str(&content);
                    self.emit(ModelEvent::Token {
                        text: content,
                        interaction,
                    })
                    .await?;
                }
                if let Some(deltas) = choice.delta.tool_calls {
                    for delta in deltas {
                        tool_calls.push(delta);
                    }
                }
            }
        }

        Ok(())
    }

    async fn emit(&self, event: ModelEvent) -> ModelResult<()> {
        self.events.send(event).await.map_err(|_| ModelError::Closed)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates one [`OpenAIChatStream`] per session from the server-wide settings.
pub struct OpenAIChatFactory {
    client: reqwest::Client,
    config: OpenAIChatConfig,
}

impl OpenAIChatFactory {
    /// The API key is checked per session, so a server without one still starts.
    pub fn new(config: OpenAIChatConfig) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::InvalidConfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAIChatConfig {
        &self.config
    }
}

impl ModelStreamFactory for OpenAIChatFactory {
    fn create(
        &self,
        call_sid: &str,
        assistant: &Assistant,
        events: mpsc::Sender<ModelEvent>,
    ) -> ModelResult<BoxedModelStream> {
        let mut config = self.config.clone();
        if let Some(model) = &assistant.model {
            config.model = model.clone();
        }

        let tools = tools_from_manifest(&assistant.manifest());
        let stream = OpenAIChatStream::spawn(
            self.client.clone(),
            config,
            call_sid,
            assistant.system_prompt.as_deref(),
            tools,
            events,
        )?;

        Ok(Box::new(stream))
    }
}
