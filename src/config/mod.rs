//! Configuration module for the relay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use relay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::assistant::Assistant;
use crate::core::llm::OpenAIChatConfig;
use crate::core::llm::openai::{OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL};
use crate::handlers::relay::SilenceConfig;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SILENCE_THRESHOLD_SECONDS: u64 = 5;
pub const DEFAULT_SILENCE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SETUP_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_TOOL_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay gateway:
/// - Server settings (host, port, TLS, public domain)
/// - Model backend (OpenAI-compatible chat completions)
/// - Silence handling and setup timeout
/// - Tool webhook
/// - Assistants
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Public host name used in the `wss://` URL of generated TwiML.
    /// Falls back to the request's Host header when unset.
    pub server_domain: Option<String>,

    // Model backend
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_temperature: Option<f32>,

    // Silence handling
    pub silence_threshold_seconds: u64,
    pub silence_max_retries: u32,
    pub silence_reminder_text: String,

    /// Connections that have not sent `setup` within this window are closed
    pub setup_timeout_seconds: u64,

    // Tool execution
    pub tool_webhook_url: Option<String>,
    pub tool_timeout_seconds: u64,

    // Assistants
    /// Inline definitions followed by those loaded from `assistants_path`
    pub assistants: Vec<Assistant>,
    pub assistants_path: Option<PathBuf>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            server_domain: None,
            openai_api_key: None,
            openai_base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            openai_model: OPENAI_DEFAULT_MODEL.to_string(),
            openai_temperature: None,
            silence_threshold_seconds: DEFAULT_SILENCE_THRESHOLD_SECONDS,
            silence_max_retries: DEFAULT_SILENCE_MAX_RETRIES,
            silence_reminder_text: SilenceConfig::default().reminder_text,
            setup_timeout_seconds: DEFAULT_SETUP_TIMEOUT_SECONDS,
            tool_webhook_url: None,
            tool_timeout_seconds: DEFAULT_TOOL_TIMEOUT_SECONDS,
            assistants: Vec::new(),
            assistants_path: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST,
            max_websocket_connections: None,
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
        }
    }
}

/// Implement Drop to zeroize secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - The assistants file cannot be loaded
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs before this runs
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn silence_config(&self) -> SilenceConfig {
        SilenceConfig {
            threshold: Duration::from_secs(self.silence_threshold_seconds),
            max_retries: self.silence_max_retries,
            reminder_text: self.silence_reminder_text.clone(),
        }
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_seconds)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }

    /// Server-wide settings for the chat completions backend.
    pub fn openai_config(&self) -> OpenAIChatConfig {
        OpenAIChatConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
            temperature: self.openai_temperature,
            ..Default::default()
        }
    }
}
