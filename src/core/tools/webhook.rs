//! Webhook-backed tool executor.
//!
//! Each tool call is POSTed as JSON to a configured URL and the response body
//! becomes the tool result. The domain logic (customer lookup, verification,
//! SMS, hand-off) lives behind that URL.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::base::{
    SharedToolExecutor, ToolCall, ToolContext, ToolError, ToolExecutor, ToolExecutorFactory,
    ToolResult,
};
use super::manifest::ToolManifest;
use crate::core::assistant::Assistant;

/// Default timeout for a single tool webhook request
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes tools by calling an HTTP webhook.
pub struct WebhookToolExecutor {
    client: reqwest::Client,
    url: Url,
    manifest: ToolManifest,
    timeout: Duration,
}

impl WebhookToolExecutor {
    pub fn new(client: reqwest::Client, url: Url, manifest: ToolManifest, timeout: Duration) -> Self {
        Self {
            client,
            url,
            manifest,
            timeout,
        }
    }

    fn request_body(context: &ToolContext, call: &ToolCall) -> Value {
        // Models occasionally emit arguments that are not valid JSON; pass them through as text.
        let arguments = serde_json::from_str::<Value>(&call.arguments)
            .unwrap_or_else(|_| Value::String(call.arguments.clone()));

        json!({
            "name": call.name,
            "arguments": arguments,
            "toolCallId": call.id,
            "callSid": context.call_sid,
            "from": context.from,
            "assistant": context.assistant_name,
        })
    }
}

#[async_trait]
impl ToolExecutor for WebhookToolExecutor {
    async fn run(&self, context: &ToolContext, call: &ToolCall) -> ToolResult<String> {
        if !self.manifest.contains(&call.name) {
            return Err(ToolError::UnknownTool(call.name.clone()));
        }

        debug!(
            call_sid = %context.call_sid,
            tool = %call.name,
            tool_call_id = %call.id,
            "Calling tool webhook"
        );

        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&Self::request_body(context, call))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout(format!("{} after {:?}", call.name, self.timeout))
                } else {
                    ToolError::Execution(format!("Webhook request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("Failed to read webhook response: {e}")))?;

        if !status.is_success() {
            return Err(ToolError::Execution(format!(
                "Webhook returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(body)
    }
}

/// Executor used when no webhook is configured; every call fails cleanly.
pub struct UnconfiguredToolExecutor;

#[async_trait]
impl ToolExecutor for UnconfiguredToolExecutor {
    async fn run(&self, _context: &ToolContext, _call: &ToolCall) -> ToolResult<String> {
        Err(ToolError::NotConfigured)
    }
}

/// Builds per-session webhook executors.
///
/// An assistant's own `tool_webhook_url` wins over the server-wide default.
pub struct WebhookToolExecutorFactory {
    client: reqwest::Client,
    default_url: Option<Url>,
    timeout: Duration,
}

impl WebhookToolExecutorFactory {
    pub fn new(default_url: Option<Url>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_url,
            timeout,
        }
    }
}

impl ToolExecutorFactory for WebhookToolExecutorFactory {
    fn create(&self, assistant: &Assistant) -> SharedToolExecutor {
        let assistant_url = assistant
            .tool_webhook_url
            .as_deref()
            .and_then(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(
                        assistant = %assistant.name,
                        error = %e,
                        "Ignoring invalid assistant tool webhook URL"
                    );
                    None
                }
            });

        match assistant_url.or_else(|| self.default_url.clone()) {
            Some(url) => std::sync::Arc::new(WebhookToolExecutor::new(
                self.client.clone(),
                url,
                assistant.manifest(),
                self.timeout,
            )),
            None => std::sync::Arc::new(UnconfiguredToolExecutor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> ToolContext {
        ToolContext {
            call_sid: "CA123".to_string(),
            from: Some("+61400000000".to_string()),
            assistant_name: "banking".to_string(),
        }
    }

    fn executor(server: &MockServer) -> WebhookToolExecutor {
        WebhookToolExecutor::new(
            reqwest::Client::new(),
            Url::parse(&format!("{}/tools", server.uri())).unwrap(),
            ToolManifest::builtin(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_webhook_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools"))
            .and(body_partial_json(json!({
                "name": "get-customer",
                "arguments": {"from": "+61400000000"},
                "toolCallId": "call_1",
                "callSid": "CA123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"Jane"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let call = ToolCall::new("call_1", "get-customer", r#"{"from":"+61400000000"}"#);
        let result = executor(&server).run(&context(), &call).await.unwrap();
        assert_eq!(result, r#"{"name":"Jane"}"#);
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let call = ToolCall::new("call_1", "verify-send", r#"{"from":"+61400000000"}"#);
        let err = executor(&server).run(&context(), &call).await.unwrap_err();
        match err {
            ToolError::Execution(msg) => assert!(msg.contains("500")),
            other => panic!("Expected Execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let call = ToolCall::new("call_1", "launch-rocket", "{}");
        let err = executor(&server).run(&context(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "launch-rocket"));
    }

    #[test]
    fn test_request_body_keeps_invalid_arguments_as_text() {
        let call = ToolCall::new("call_9", "verify-code", "{not json");
        let body = WebhookToolExecutor::request_body(&context(), &call);
        assert_eq!(body["arguments"], "{not json");
        assert_eq!(body["assistant"], "banking");
    }

    #[tokio::test]
    async fn test_factory_without_url_is_unconfigured() {
        let factory = WebhookToolExecutorFactory::new(None, DEFAULT_TOOL_TIMEOUT);
        let executor = factory.create(&Assistant::new("banking", "Hi"));
        let call = ToolCall::new("call_1", "get-customer", "{}");
        let err = executor.run(&context(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured));
    }

    #[tokio::test]
    async fn test_factory_prefers_assistant_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistant-tools"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let factory = WebhookToolExecutorFactory::new(
            Some(Url::parse("http://127.0.0.1:1/unused").unwrap()),
            DEFAULT_TOOL_TIMEOUT,
        );
        let mut assistant = Assistant::new("banking", "Hi");
        assistant.tool_webhook_url = Some(format!("{}/assistant-tools", server.uri()));

        let executor = factory.create(&assistant);
        let call = ToolCall::new("call_1", "get-customer", "{}");
        assert_eq!(executor.run(&context(), &call).await.unwrap(), "ok");
    }
}
