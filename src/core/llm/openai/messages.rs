//! Wire types for the OpenAI chat completions API (streaming mode).
//!
//! Requests carry the full conversation history plus the tool manifest.
//! Responses arrive as `chat.completion.chunk` objects, one per SSE `data:` line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::llm::base::Role;
use crate::core::tools::{ToolCall, ToolDescriptor, ToolManifest};

// =============================================================================
// Conversation Messages
// =============================================================================

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Absent on assistant messages that only carry tool calls
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant turn with optional spoken text and requested tool calls.
    pub fn assistant(content: Option<String>, tool_calls: Vec<ChatToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_call_id: None,
            tool_calls,
        }
    }
}

/// Tool call as stored in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<&ChatToolCall> for ToolCall {
    fn from(call: &ChatToolCall) -> Self {
        ToolCall::new(&call.id, &call.function.name, &call.function.arguments)
    }
}

// =============================================================================
// Request
// =============================================================================

/// Function tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: ChatToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDescriptor> for ChatTool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            tool_type: "function",
            function: ChatToolFunction {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.parameters_schema(),
            },
        }
    }
}

/// Convert a manifest into the `tools` request field.
pub fn tools_from_manifest(manifest: &ToolManifest) -> Vec<ChatTool> {
    manifest.tools().iter().map(ChatTool::from).collect()
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ChatTool],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn no_tools(tools: &&[ChatTool]) -> bool {
    tools.is_empty()
}

// =============================================================================
// Streamed Response
// =============================================================================

/// One `chat.completion.chunk`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Some compatible servers report failures inside the stream
    #[serde(default)]
    pub error: Option<StreamError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Fragment of a streamed tool call. Fragments share an `index`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub message: String,
}

/// Error body of a non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: StreamError,
}

// =============================================================================
// Tool Call Accumulation
// =============================================================================

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles tool calls from streamed fragments.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id
            && !id.is_empty()
        {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name
                && !name.is_empty()
            {
                entry.name = name;
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order. Fragments without id or name are dropped.
    pub fn finish(self) -> Vec<ChatToolCall> {
        self.calls
            .into_values()
            .filter_map(|partial| {
                if partial.id.is_empty() || partial.name.is_empty() {
                    tracing::warn!(
                        tool_call_id = %partial.id,
                        tool_name = %partial.name,
                        "Dropping incomplete streamed tool call"
                    );
                    return None;
                }
                Some(ChatToolCall {
                    id: partial.id,
                    call_type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: partial.name,
                        arguments: if partial.arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            partial.arguments
                        },
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            ChatMessage::text(Role::System, "Be brief."),
            ChatMessage::text(Role::User, "Hi"),
        ];
        let tools = tools_from_manifest(&ToolManifest::builtin());
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            stream: true,
            tools: &tools,
            temperature: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["messages"][0]["role"], json!("system"));
        assert!(value["messages"][0].get("tool_calls").is_none());
        assert!(value.get("temperature").is_none());
        assert_eq!(value["tools"][0]["type"], json!("function"));
        assert_eq!(value["tools"][0]["function"]["name"], json!("get-customer"));
        assert_eq!(
            value["tools"][0]["function"]["parameters"]["type"],
            json!("object")
        );
    }

    #[test]
    fn test_empty_tools_are_omitted() {
        let request = ChatCompletionRequest {
            model: "m",
            messages: &[],
            stream: true,
            tools: &[],
            temperature: Some(0.2),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_tool_message_and_assistant_tool_calls() {
        let assistant = ChatMessage::assistant(
            None,
            vec![ChatToolCall {
                id: "call_1".into(),
                call_type: "function".into(),
                function: ChatFunctionCall {
                    name: "get-customer".into(),
                    arguments: "{}".into(),
                },
            }],
        );
        let value = serde_json::to_value(&assistant).unwrap();
        assert_eq!(value["content"], serde_json::Value::Null);
        assert_eq!(value["tool_calls"][0]["id"], json!("call_1"));

        let tool = serde_json::to_value(ChatMessage::tool("call_1", "{\"ok\":true}")).unwrap();
        assert_eq!(tool["role"], json!("tool"));
        assert_eq!(tool["tool_call_id"], json!("call_1"));
    }

    #[test]
    fn test_chunk_deserialization() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"x","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
        assert!(chunk.error.is_none());
    }

    #[test]
    fn test_accumulator_merges_fragments_by_index() {
        let mut acc = ToolCallAccumulator::default();
        let fragments = [
            r#"{"index":0,"id":"call_a","function":{"name":"get-customer","arguments":""}}"#,
            r#"{"index":1,"id":"call_b","function":{"name":"verify-send","arguments":"{\"fr"}}"#,
            r#"{"index":0,"function":{"arguments":"{\"from\":"}}"#,
            r#"{"index":0,"function":{"arguments":"\"+1555\"}"}}"#,
            r#"{"index":1,"function":{"arguments":"om\":\"+1\"}"}}"#,
        ];
        for fragment in fragments {
            acc.push(serde_json::from_str(fragment).unwrap());
        }

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.arguments, r#"{"from":"+1555"}"#);
        assert_eq!(calls[1].function.name, "verify-send");
        assert_eq!(calls[1].function.arguments, r#"{"from":"+1"}"#);
    }

    #[test]
    fn test_accumulator_drops_nameless_calls_and_defaults_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(serde_json::from_str(r#"{"index":0,"function":{"arguments":"{}"}}"#).unwrap());
        acc.push(
            serde_json::from_str(r#"{"index":1,"id":"call_x","function":{"name":"live-agent-handoff"}}"#)
                .unwrap(),
        );

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, "{}");
        let call = ToolCall::from(&calls[0]);
        assert_eq!(call.id, "call_x");
    }
}
