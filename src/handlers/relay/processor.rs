//! Inbound frame dispatch
//!
//! Parses raw gateway text frames and hands the typed frame to a
//! [`FrameHandler`]. Parse failures never cross this boundary: they are
//! logged and the connection carries on.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::messages::{FrameError, InboundFrame};

/// Receives typed frames from [`dispatch`].
#[async_trait]
pub trait FrameHandler: Send {
    /// Returns false when the connection must be torn down.
    async fn handle_frame(&mut self, frame: InboundFrame) -> bool;

    /// Called when a frame of `frame_type` arrived but its payload was dropped.
    fn handle_rejected_frame(&mut self, _frame_type: &str) {}
}

/// Decode a raw text frame.
///
/// Unrecognized `type` values become [`InboundFrame::Unknown`] so the
/// session can log them.
pub fn parse_frame(raw: &str) -> Result<InboundFrame, FrameError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| FrameError::MalformedJson(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(FrameError::NotAnObject);
    };

    let frame_type = match object.get("type") {
        Some(Value::String(frame_type)) => frame_type.clone(),
        _ => return Err(FrameError::MissingType),
    };

    if !InboundFrame::is_known_type(&frame_type) {
        return Ok(InboundFrame::Unknown { frame_type });
    }

    let frame: InboundFrame =
        serde_json::from_value(Value::Object(object)).map_err(|e| FrameError::InvalidPayload {
            frame_type,
            reason: e.to_string(),
        })?;

    frame.validate_size()?;
    Ok(frame)
}

/// Parse `raw` and route it to `handler`.
///
/// # Returns
/// * `bool` - true to continue processing, false to terminate the connection
pub async fn dispatch<H>(raw: &str, handler: &mut H) -> bool
where
    H: FrameHandler + ?Sized,
{
    match parse_frame(raw) {
        Ok(frame) => {
            debug!(frame_type = %frame.frame_type(), "Dispatching frame");
            handler.handle_frame(frame).await
        }
        Err(e) => {
            warn!(error = %e, "Dropping invalid frame");
            if let Some(frame_type) = e.frame_type() {
                handler.handle_rejected_frame(frame_type);
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::relay::messages::MAX_PROMPT_SIZE;

    #[derive(Default)]
    struct RecordingHandler {
        frames: Vec<InboundFrame>,
        rejected: Vec<String>,
        verdict: bool,
    }

    #[async_trait]
    impl FrameHandler for RecordingHandler {
        async fn handle_frame(&mut self, frame: InboundFrame) -> bool {
            self.frames.push(frame);
            self.verdict
        }

        fn handle_rejected_frame(&mut self, frame_type: &str) {
            self.rejected.push(frame_type.to_string());
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_frame("{not json"),
            Err(FrameError::MalformedJson(_))
        ));
        assert_eq!(parse_frame("[1,2]"), Err(FrameError::NotAnObject));
        assert_eq!(
            parse_frame(r#"{"voicePrompt":"hi"}"#),
            Err(FrameError::MissingType)
        );
        assert_eq!(parse_frame(r#"{"type":7}"#), Err(FrameError::MissingType));
        assert!(matches!(
            parse_frame(r#"{"type":"prompt"}"#),
            Err(FrameError::InvalidPayload { ref frame_type, .. }) if frame_type == "prompt"
        ));
    }

    #[test]
    fn test_unknown_type_preserved() {
        let frame = parse_frame(r#"{"type":"transcript","text":"x"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Unknown {
                frame_type: "transcript".into()
            }
        );
        assert_eq!(frame.frame_type(), "transcript");

        // Types are case-sensitive
        let frame = parse_frame(r#"{"type":"Prompt","voicePrompt":"hi"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown { .. }));
    }

    #[test]
    fn test_oversized_prompt_rejected() {
        let raw = serde_json::json!({
            "type": "prompt",
            "voicePrompt": "a".repeat(MAX_PROMPT_SIZE + 1),
        })
        .to_string();
        assert!(matches!(
            parse_frame(&raw),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_routes_prompt() {
        let mut handler = RecordingHandler {
            verdict: true,
            ..Default::default()
        };

        assert!(dispatch(r#"{"type":"prompt","voicePrompt":"hello"}"#, &mut handler).await);
        assert_eq!(handler.frames.len(), 1);
        match &handler.frames[0] {
            InboundFrame::Prompt(prompt) => assert_eq!(prompt.voice_prompt, "hello"),
            other => panic!("Expected Prompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_drops_malformed_frames() {
        let mut handler = RecordingHandler::default();

        assert!(dispatch("not json at all", &mut handler).await);
        assert!(dispatch(r#""just a string""#, &mut handler).await);
        assert!(handler.frames.is_empty());
        assert!(handler.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_rejected_typed_frames() {
        let mut handler = RecordingHandler::default();

        assert!(dispatch(r#"{"type":"dtmf","digit":5}"#, &mut handler).await);
        assert!(dispatch(r#"{"type":"prompt"}"#, &mut handler).await);
        let oversized = serde_json::json!({
            "type": "prompt",
            "voicePrompt": "a".repeat(MAX_PROMPT_SIZE + 1),
        })
        .to_string();
        assert!(dispatch(&oversized, &mut handler).await);

        assert!(handler.frames.is_empty());
        assert_eq!(handler.rejected, vec!["dtmf", "prompt", "prompt"]);
    }

    #[tokio::test]
    async fn test_dispatch_propagates_handler_verdict() {
        let mut handler = RecordingHandler {
            verdict: false,
            ..Default::default()
        };
        assert!(!dispatch(r#"{"type":"dtmf","digit":"5"}"#, &mut handler).await);
    }
}
