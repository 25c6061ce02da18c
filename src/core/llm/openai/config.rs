//! OpenAI chat completions configuration.

use std::fmt;
use std::time::Duration;

use crate::core::llm::base::{ModelError, ModelResult};

/// Default OpenAI REST endpoint.
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used when neither the server config nor the assistant names one.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Upper bound for a single streamed response, connect included.
pub const OPENAI_DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAIChatConfig {
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub request_timeout: Duration,
}

impl Default for OpenAIChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            temperature: None,
            request_timeout: OPENAI_DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for OpenAIChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIChatConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl OpenAIChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Full URL of the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ModelError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ModelError::InvalidConfiguration(
                "Model name is required".to_string(),
            ));
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ModelError::InvalidConfiguration(format!(
                "Temperature must be between 0 and 2, got {temperature}"
            )));
        }
        Ok(())
    }
}
