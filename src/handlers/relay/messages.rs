//! Conversation Relay WebSocket message types
//!
//! Frames exchanged with the telephony gateway. Every frame is a JSON object
//! tagged by its `type` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Maximum allowed size for a caller utterance (16 KB)
pub const MAX_PROMPT_SIZE: usize = 16 * 1024;

/// Frame types understood by the session controller
pub const KNOWN_FRAME_TYPES: [&str; 5] = ["setup", "prompt", "info", "interrupt", "dtmf"];

// =============================================================================
// Errors
// =============================================================================

/// Reasons an inbound frame is rejected before it reaches the session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no string 'type' field")]
    MissingType,

    #[error("Invalid '{frame_type}' payload: {reason}")]
    InvalidPayload { frame_type: String, reason: String },

    #[error("Prompt too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

impl FrameError {
    /// The frame's `type` when it was readable before the payload was rejected.
    pub fn frame_type(&self) -> Option<&str> {
        match self {
            FrameError::InvalidPayload { frame_type, .. } => Some(frame_type),
            FrameError::TooLarge { .. } => Some("prompt"),
            _ => None,
        }
    }
}

// =============================================================================
// Incoming Frames (Gateway -> Server)
// =============================================================================

/// Frames received from the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// First frame of every call
    Setup(SetupFrame),

    /// Transcribed caller speech
    Prompt(PromptFrame),

    /// Informational gateway event; fields kept verbatim
    Info(Map<String, Value>),

    /// Caller spoke over the assistant
    Interrupt(InterruptFrame),

    /// Keypad digit
    Dtmf(DtmfFrame),

    /// Any other `type`; never produced by serde
    #[serde(skip_deserializing)]
    Unknown { frame_type: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupFrame {
    #[serde(default)]
    pub session_id: Option<String>,
    pub call_sid: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub custom_parameters: CustomParameters,
}

/// `<Parameter>` values from the call-initiation markup
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomParameters {
    #[serde(default)]
    pub assistant: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFrame {
    pub voice_prompt: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub last: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptFrame {
    #[serde(default)]
    pub utterance_until_interrupt: Option<String>,
    #[serde(default)]
    pub duration_until_interrupt_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfFrame {
    pub digit: String,
}

impl InboundFrame {
    /// Value of the `type` field this frame was parsed from.
    pub fn frame_type(&self) -> &str {
        match self {
            InboundFrame::Setup(_) => "setup",
            InboundFrame::Prompt(_) => "prompt",
            InboundFrame::Info(_) => "info",
            InboundFrame::Interrupt(_) => "interrupt",
            InboundFrame::Dtmf(_) => "dtmf",
            InboundFrame::Unknown { frame_type } => frame_type,
        }
    }

    pub fn is_known_type(frame_type: &str) -> bool {
        KNOWN_FRAME_TYPES.contains(&frame_type)
    }

    /// Validates field sizes to prevent resource exhaustion.
    pub fn validate_size(&self) -> Result<(), FrameError> {
        if let InboundFrame::Prompt(prompt) = self {
            let size = prompt.voice_prompt.len();
            if size > MAX_PROMPT_SIZE {
                return Err(FrameError::TooLarge {
                    size,
                    max: MAX_PROMPT_SIZE,
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Outgoing Frames (Server -> Gateway)
// =============================================================================

/// Frames sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Text to speak; `last` closes the assistant's turn
    Text { token: String, last: bool },

    /// Ends the call; `handoffData` is passed back to the telephony application
    End {
        #[serde(rename = "handoffData")]
        handoff_data: String,
    },
}

impl OutboundFrame {
    pub fn text(token: impl Into<String>, last: bool) -> Self {
        OutboundFrame::Text {
            token: token.into(),
            last,
        }
    }

    /// Empty final token marking the end of a model turn.
    pub fn end_of_turn() -> Self {
        Self::text("", true)
    }

    /// End frame sent when the caller stayed silent through every reminder.
    pub fn silence_timeout(retries: u32) -> Self {
        let handoff = json!({
            "reasonCode": "silence-timeout",
            "reason": format!("No caller input after {retries} reminders"),
        });
        OutboundFrame::End {
            handoff_data: handoff.to_string(),
        }
    }
}

/// Routes handed to the WebSocket writer task
#[derive(Debug)]
pub enum RelayRoute {
    Outgoing(OutboundFrame),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_deserialization() {
        let json = r#"{
            "type": "setup",
            "sessionId": "VX123",
            "callSid": "CA123",
            "from": "+61400000000",
            "to": "+61200000000",
            "direction": "inbound",
            "customParameters": {"assistant": "banking", "campaign": "spring"}
        }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("Should deserialize");
        match frame {
            InboundFrame::Setup(setup) => {
                assert_eq!(setup.call_sid, "CA123");
                assert_eq!(setup.from.as_deref(), Some("+61400000000"));
                assert_eq!(setup.custom_parameters.assistant.as_deref(), Some("banking"));
                assert_eq!(
                    setup.custom_parameters.extra.get("campaign"),
                    Some(&Value::from("spring"))
                );
            }
            other => panic!("Expected Setup, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_and_interrupt_deserialization() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"prompt","voicePrompt":"What's my balance?","lang":"en-US","last":true}"#,
        )
        .unwrap();
        assert_eq!(frame.frame_type(), "prompt");
        assert!(matches!(
            frame,
            InboundFrame::Prompt(PromptFrame { ref voice_prompt, last: Some(true), .. })
                if voice_prompt == "What's my balance?"
        ));

        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"interrupt","utteranceUntilInterrupt":"Your balance is","durationUntilInterruptMs":840}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Interrupt(interrupt) => {
                assert_eq!(interrupt.duration_until_interrupt_ms, Some(840));
            }
            other => panic!("Expected Interrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_info_keeps_fields() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"info","name":"tokensPlayed","value":3}"#).unwrap();
        match frame {
            InboundFrame::Info(fields) => {
                assert_eq!(fields.get("name"), Some(&Value::from("tokensPlayed")));
            }
            other => panic!("Expected Info, got {other:?}"),
        }
    }

    #[test]
    fn test_text_frame_serialization() {
        let json = serde_json::to_string(&OutboundFrame::text("Hello", true)).unwrap();
        assert_eq!(json, r#"{"type":"text","token":"Hello","last":true}"#);

        let json = serde_json::to_string(&OutboundFrame::end_of_turn()).unwrap();
        assert_eq!(json, r#"{"type":"text","token":"","last":true}"#);
    }

    #[test]
    fn test_silence_timeout_end_frame() {
        let value = serde_json::to_value(OutboundFrame::silence_timeout(3)).unwrap();
        assert_eq!(value["type"], "end");
        let handoff: Value =
            serde_json::from_str(value["handoffData"].as_str().unwrap()).unwrap();
        assert_eq!(handoff["reasonCode"], "silence-timeout");
    }

    #[test]
    fn test_validation_prompt_exceeds_limit() {
        let frame = InboundFrame::Prompt(PromptFrame {
            voice_prompt: "a".repeat(MAX_PROMPT_SIZE + 1),
            lang: None,
            last: None,
        });
        assert!(matches!(
            frame.validate_size(),
            Err(FrameError::TooLarge { .. })
        ));

        let frame = InboundFrame::Prompt(PromptFrame {
            voice_prompt: "a".repeat(MAX_PROMPT_SIZE),
            lang: None,
            last: None,
        });
        assert!(frame.validate_size().is_ok());
    }
}
