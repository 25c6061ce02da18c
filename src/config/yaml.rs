use serde::Deserialize;
use std::path::PathBuf;

use crate::core::assistant::Assistant;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values given here override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   domain: "relay.example.com"
///
/// openai:
///   api_key: "your-openai-key"
///   base_url: "https://api.openai.com/v1"
///   model: "gpt-4o-mini"
///   temperature: 0.7
///
/// silence:
///   threshold_seconds: 5
///   max_retries: 3
///   reminder_text: "Are you still there?"
///
/// session:
///   setup_timeout_seconds: 30
///
/// tools:
///   webhook_url: "https://tools.example.com/run"
///   timeout_seconds: 10
///
/// assistants_path: "/etc/relay/assistants.yaml"
/// assistants:
///   - name: banking
///     initial_message: "Welcome to Owl Bank. How can I help?"
///     system_prompt: "You are a helpful banking assistant."
///     tts_provider: "ElevenLabs"
///     tts_voice: "UgBBYS2sOqTuMpoF3BR0"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub silence: Option<SilenceYaml>,
    pub session: Option<SessionYaml>,
    pub tools: Option<ToolsYaml>,
    pub security: Option<SecurityYaml>,
    pub assistants: Option<Vec<Assistant>>,
    pub assistants_path: Option<String>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
    /// Public host name advertised in generated TwiML
    pub domain: Option<String>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Chat completions backend from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SilenceYaml {
    pub threshold_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub reminder_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub setup_timeout_seconds: Option<u64>,
}

/// Tool webhook configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub webhook_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Security configuration from YAML
///
/// # Example YAML structure
/// ```yaml
/// security:
///   cors_allowed_origins: "https://example.com,https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
