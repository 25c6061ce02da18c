//! Assistant definitions and the resolver used at session setup.
//!
//! An assistant bundles everything a call needs before the first utterance:
//! the greeting, the system prompt, voice settings for the call-initiation
//! markup, and an optional tool manifest override.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::tools::ToolManifest;

/// Default language for ConversationRelay speech recognition and TTS
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";

fn default_language_code() -> String {
    DEFAULT_LANGUAGE_CODE.to_string()
}

/// A configured voice assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    /// Unique name; referenced by the `assistant` custom parameter of the setup frame
    #[serde(alias = "assistant_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// System prompt placed at the top of the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// First words spoken to the caller
    pub initial_message: String,

    #[serde(default = "default_language_code")]
    pub language_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,

    /// Model override; the server-wide model is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool manifest override; the built-in manifest is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolManifest>,

    /// Per-assistant tool webhook; falls back to the server-wide webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_webhook_url: Option<String>,
}

impl Assistant {
    /// Minimal assistant with defaults for everything but name and greeting.
    pub fn new(name: impl Into<String>, initial_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            system_prompt: None,
            initial_message: initial_message.into(),
            language_code: default_language_code(),
            tts_provider: None,
            tts_voice: None,
            model: None,
            tools: None,
            tool_webhook_url: None,
        }
    }

    /// Tool manifest for sessions run by this assistant.
    pub fn manifest(&self) -> ToolManifest {
        self.tools.clone().unwrap_or_else(ToolManifest::builtin)
    }
}

/// Resolves assistant configuration by name.
///
/// Shared process-wide and read-mostly; sessions only hold the returned `Arc`.
#[async_trait]
pub trait AssistantResolver: Send + Sync {
    async fn get_assistant(&self, name: &str) -> Option<Arc<Assistant>>;

    async fn list_assistants(&self) -> Vec<Arc<Assistant>>;
}

/// In-memory assistant registry built from configuration.
#[derive(Debug, Default)]
pub struct AssistantRegistry {
    by_name: HashMap<String, Arc<Assistant>>,
    /// Declaration order, for listing
    order: Vec<Arc<Assistant>>,
}

impl AssistantRegistry {
    /// Build a registry. Later entries with a duplicate name are ignored.
    pub fn new(assistants: Vec<Assistant>) -> Self {
        let mut registry = Self::default();
        for assistant in assistants {
            if registry.by_name.contains_key(&assistant.name) {
                tracing::warn!(
                    assistant = %assistant.name,
                    "Duplicate assistant definition ignored"
                );
                continue;
            }
            let assistant = Arc::new(assistant);
            registry
                .by_name
                .insert(assistant.name.clone(), assistant.clone());
            registry.order.push(assistant);
        }
        registry
    }

    /// Load a list of assistants from a YAML (or JSON) file.
    pub fn load_file(path: &Path) -> Result<Vec<Assistant>, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read assistants file {}: {e}", path.display()))?;

        let assistants: Vec<Assistant> = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse assistants file {}: {e}", path.display()))?;

        Ok(assistants)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[async_trait]
impl AssistantResolver for AssistantRegistry {
    async fn get_assistant(&self, name: &str) -> Option<Arc<Assistant>> {
        self.by_name.get(name).cloned()
    }

    async fn list_assistants(&self) -> Vec<Arc<Assistant>> {
        self.order.clone()
    }
}
