//! Assistant lookup endpoints

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::core::assistant::Assistant;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssistantQuery {
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /assistants`: every configured assistant, in declaration order
pub async fn list_assistants(State(state): State<Arc<AppState>>) -> Json<Vec<Assistant>> {
    let assistants = state.services.assistants.list_assistants().await;
    debug!(count = assistants.len(), "Listing assistants");

    Json(assistants.iter().map(|a| a.as_ref().clone()).collect())
}

/// `GET /assistant?name=<name>`
pub async fn get_assistant(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssistantQuery>,
) -> AppResult<Json<Assistant>> {
    let name = query
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::NotFound("Assistant not found".to_string()))?;

    let assistant = state
        .services
        .assistants
        .get_assistant(&name)
        .await
        .ok_or_else(|| AppError::NotFound("Assistant not found".to_string()))?;

    Ok(Json(assistant.as_ref().clone()))
}
