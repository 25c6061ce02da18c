//! Call-initiation markup
//!
//! The telephony provider fetches TwiML when a call arrives. The response
//! connects the call to this server's relay endpoint and passes the chosen
//! assistant through as a custom parameter, which comes back in `setup`.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::assistant::Assistant;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Path the generated markup points the gateway at
pub const RELAY_PATH: &str = "/conversation-relay";

#[derive(Debug, Deserialize)]
pub struct TwimlQuery {
    #[serde(default)]
    pub assistant: Option<String>,
}

/// `POST /twiml?assistant=<name>`
pub async fn twiml_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TwimlQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let name = query.assistant.unwrap_or_default();
    let assistant = state
        .services
        .assistants
        .get_assistant(&name)
        .await
        .ok_or_else(|| AppError::NotFound("Assistant not found".to_string()))?;

    let domain = state
        .config
        .server_domain
        .clone()
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::BadRequest("Server domain is not configured".to_string()))?;

    let xml = render_twiml(&domain, &assistant);
    info!(assistant = %assistant.name, domain = %domain, "Serving call TwiML");
    debug!(twiml = %xml, "TwiML response");

    Ok(([(header::CONTENT_TYPE, "text/xml")], xml).into_response())
}

/// Render the `<Connect><ConversationRelay>` document for `assistant`.
pub fn render_twiml(domain: &str, assistant: &Assistant) -> String {
    let mut language = format!(
        r#"<Language code="{}""#,
        escape_xml(&assistant.language_code)
    );
    if let Some(provider) = &assistant.tts_provider {
        let _ = write!(language, r#" ttsProvider="{}""#, escape_xml(provider));
    }
    if let Some(voice) = &assistant.tts_voice {
        let _ = write!(language, r#" voice="{}""#, escape_xml(voice));
    }
    language.push_str(" />");

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response><Connect>",
            r#"<ConversationRelay url="wss://{domain}{path}">"#,
            "{language}",
            r#"<Parameter name="assistant" value="{name}" />"#,
            "</ConversationRelay>",
            "</Connect></Response>"
        ),
        domain = escape_xml(domain),
        path = RELAY_PATH,
        language = language,
        name = escape_xml(&assistant.name),
    )
}

/// Escape the five XML special characters for use in attribute values.
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
