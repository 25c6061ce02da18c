//! Correlation of asynchronous tool executions with the model stream.
//!
//! Every model-requested call runs on its own task. Results come back to the
//! session task over a channel and are matched to their pending context by
//! tool call id before being fed to the model as `tool` turns.

use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::core::llm::{CompletionRequest, ModelStream};
use crate::core::tools::{SharedToolExecutor, ToolCall, ToolContext};

/// Result of one tool execution, delivered to the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub result: String,
}

/// A dispatched call awaiting its result.
#[derive(Debug)]
pub struct ToolCallContext {
    pub call: ToolCall,
    pub dispatched_at: Instant,
    abort: AbortHandle,
}

pub struct ToolDispatchBridge {
    executor: SharedToolExecutor,
    results_tx: mpsc::Sender<ToolOutcome>,
    pending: HashMap<String, ToolCallContext>,
}

impl ToolDispatchBridge {
    pub fn new(executor: SharedToolExecutor, results_tx: mpsc::Sender<ToolOutcome>) -> Self {
        Self {
            executor,
            results_tx,
            pending: HashMap::new(),
        }
    }

    /// Start executing `call`. Returns false if its id is already pending.
    ///
    /// Executor failures are reported to the model as `{"error": "..."}`.
    pub fn dispatch(&mut self, context: &ToolContext, call: ToolCall) -> bool {
        if self.pending.contains_key(&call.id) {
            warn!(
                call_sid = %context.call_sid,
                tool_call_id = %call.id,
                "Duplicate tool call id, ignoring"
            );
            return false;
        }

        info!(
            call_sid = %context.call_sid,
            tool_call_id = %call.id,
            tool_name = %call.name,
            "Dispatching tool call"
        );

        let executor = self.executor.clone();
        let results_tx = self.results_tx.clone();
        let task_context = context.clone();
        let task_call = call.clone();

        let handle = tokio::spawn(async move {
            let result = match executor.run(&task_context, &task_call).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        call_sid = %task_context.call_sid,
                        tool_call_id = %task_call.id,
                        tool_name = %task_call.name,
                        error = %e,
                        "Tool execution failed"
                    );
                    json!({ "error": e.to_string() }).to_string()
                }
            };

            let _ = results_tx
                .send(ToolOutcome {
                    tool_call_id: task_call.id,
                    result,
                })
                .await;
        });

        self.pending.insert(
            call.id.clone(),
            ToolCallContext {
                call,
                dispatched_at: Instant::now(),
                abort: handle.abort_handle(),
            },
        );
        true
    }

    /// Feed a finished execution to the model as a `tool` turn.
    ///
    /// Returns false for ids that are unknown or already resolved.
    pub fn on_result(
        &mut self,
        outcome: ToolOutcome,
        interaction: u64,
        model: &mut dyn ModelStream,
    ) -> bool {
        let Some(context) = self.pending.remove(&outcome.tool_call_id) else {
            warn!(
                tool_call_id = %outcome.tool_call_id,
                "Result for unknown tool call id, discarding"
            );
            return false;
        };

        info!(
            tool_call_id = %outcome.tool_call_id,
            tool_name = %context.call.name,
            elapsed_ms = context.dispatched_at.elapsed().as_millis() as u64,
            "Tool call completed"
        );

        match model.completion(CompletionRequest::tool_result(
            outcome.tool_call_id,
            outcome.result,
            interaction,
        )) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to hand tool result to model stream");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, tool_call_id: &str) -> bool {
        self.pending.contains_key(tool_call_id)
    }

    /// Abort every in-flight execution.
    pub fn cleanup(&mut self) {
        for (_, context) in self.pending.drain() {
            context.abort.abort();
        }
    }
}

impl Drop for ToolDispatchBridge {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::{ModelResult, Role};
    use crate::core::tools::{ToolError, ToolExecutor, ToolResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingModel {
        completions: Vec<CompletionRequest>,
    }

    impl ModelStream for RecordingModel {
        fn add_context(&mut self, _text: &str, _role: Role) {}

        fn completion(&mut self, request: CompletionRequest) -> ModelResult<()> {
            self.completions.push(request);
            Ok(())
        }

        fn destroy(&mut self) {}
    }

    /// Answers `get-customer`, fails everything else, never finishes `hang`.
    struct ScriptedExecutor;

    #[async_trait]
    impl ToolExecutor for ScriptedExecutor {
        async fn run(&self, context: &ToolContext, call: &ToolCall) -> ToolResult<String> {
            match call.name.as_str() {
                "get-customer" => Ok(format!(r#"{{"from":"{}"}}"#, context.call_sid)),
                "hang" => std::future::pending().await,
                other => Err(ToolError::UnknownTool(other.to_string())),
            }
        }
    }

    fn bridge() -> (ToolDispatchBridge, mpsc::Receiver<ToolOutcome>) {
        let (tx, rx) = mpsc::channel(8);
        (ToolDispatchBridge::new(Arc::new(ScriptedExecutor), tx), rx)
    }

    fn context() -> ToolContext {
        ToolContext {
            call_sid: "CA123".into(),
            from: Some("+61400000000".into()),
            assistant_name: "banking".into(),
        }
    }

    async fn recv(rx: &mut mpsc::Receiver<ToolOutcome>) -> ToolOutcome {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for tool outcome")
            .expect("outcome channel closed")
    }

    #[tokio::test]
    async fn test_results_reach_model_in_resolution_order() {
        let (mut bridge, _rx) = bridge();
        let mut model = RecordingModel::default();

        assert!(bridge.dispatch(&context(), ToolCall::new("a", "hang", "{}")));
        assert!(bridge.dispatch(&context(), ToolCall::new("b", "hang", "{}")));
        assert_eq!(bridge.pending_count(), 2);

        let b = ToolOutcome {
            tool_call_id: "b".into(),
            result: "B".into(),
        };
        let a = ToolOutcome {
            tool_call_id: "a".into(),
            result: "A".into(),
        };
        assert!(bridge.on_result(b, 2, &mut model));
        assert!(bridge.on_result(a, 2, &mut model));

        let ids: Vec<_> = model
            .completions
            .iter()
            .map(|c| c.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(model.completions.iter().all(|c| c.role == Role::Tool));
        assert_eq!(model.completions[0].content, "B");
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_resolved_id_is_noop() {
        let (mut bridge, _rx) = bridge();
        let mut model = RecordingModel::default();

        let stray = ToolOutcome {
            tool_call_id: "zzz".into(),
            result: "{}".into(),
        };
        assert!(!bridge.on_result(stray, 0, &mut model));

        bridge.dispatch(&context(), ToolCall::new("a", "hang", "{}"));
        let outcome = ToolOutcome {
            tool_call_id: "a".into(),
            result: "{}".into(),
        };
        assert!(bridge.on_result(outcome.clone(), 0, &mut model));
        assert!(!bridge.on_result(outcome, 0, &mut model));
        assert_eq!(model.completions.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pending_id_rejected() {
        let (mut bridge, _rx) = bridge();
        assert!(bridge.dispatch(&context(), ToolCall::new("a", "hang", "{}")));
        assert!(!bridge.dispatch(&context(), ToolCall::new("a", "get-customer", "{}")));
        assert_eq!(bridge.pending_count(), 1);
        assert_eq!(bridge.pending.get("a").unwrap().call.name, "hang");
    }

    #[tokio::test]
    async fn test_execution_results_and_errors_are_delivered() {
        let (mut bridge, mut rx) = bridge();

        bridge.dispatch(&context(), ToolCall::new("ok", "get-customer", "{}"));
        let outcome = recv(&mut rx).await;
        assert_eq!(outcome.tool_call_id, "ok");
        assert_eq!(outcome.result, r#"{"from":"CA123"}"#);

        bridge.dispatch(&context(), ToolCall::new("bad", "launch-rocket", "{}"));
        let outcome = recv(&mut rx).await;
        let value: serde_json::Value = serde_json::from_str(&outcome.result).unwrap();
        assert_eq!(value["error"], "Unknown tool: launch-rocket");
        assert!(bridge.is_pending("bad"));
    }

    #[tokio::test]
    async fn test_cleanup_aborts_pending_calls() {
        let (mut bridge, mut rx) = bridge();
        bridge.dispatch(&context(), ToolCall::new("a", "hang", "{}"));
        bridge.dispatch(&context(), ToolCall::new("b", "hang", "{}"));

        bridge.cleanup();
        assert_eq!(bridge.pending_count(), 0);
        assert!(!bridge.is_pending("a"));

        drop(bridge);
        // Aborted tasks drop their senders, closing the channel without a result
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
