//! Environment variable loading.
//!
//! `.env` is read by `main` before anything here runs, so a variable set in the
//! real environment wins over the same name in `.env`.

use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_string};
use super::{ServerConfig, TlsConfig, merge, validation};

/// Build a configuration from defaults overlaid with environment variables.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    if env_bool("TLS_ENABLED")?.unwrap_or(false) {
        let cert_path = env_string("TLS_CERT_PATH")
            .ok_or("TLS_ENABLED is set but TLS_CERT_PATH is missing")?;
        let key_path =
            env_string("TLS_KEY_PATH").ok_or("TLS_ENABLED is set but TLS_KEY_PATH is missing")?;
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        });
    }

    config.server_domain = env_string("SERVER_DOMAIN");

    config.openai_api_key = env_string("OPENAI_API_KEY");
    if let Some(base_url) = env_string("OPENAI_BASE_URL") {
        config.openai_base_url = base_url;
    }
    if let Some(model) = env_string("OPENAI_MODEL") {
        config.openai_model = model;
    }
    config.openai_temperature = env_parse("OPENAI_TEMPERATURE")?;

    if let Some(threshold) = env_parse("SILENCE_THRESHOLD_SECONDS")? {
        config.silence_threshold_seconds = threshold;
    }
    if let Some(retries) = env_parse("SILENCE_MAX_RETRIES")? {
        config.silence_max_retries = retries;
    }
    if let Some(text) = env_string("SILENCE_REMINDER_TEXT") {
        config.silence_reminder_text = text;
    }
    if let Some(timeout) = env_parse("SETUP_TIMEOUT_SECONDS")? {
        config.setup_timeout_seconds = timeout;
    }

    config.tool_webhook_url = env_string("TOOL_WEBHOOK_URL");
    if let Some(timeout) = env_parse("TOOL_TIMEOUT_SECONDS")? {
        config.tool_timeout_seconds = timeout;
    }

    config.assistants_path = env_string("ASSISTANTS_PATH").map(PathBuf::from);

    config.cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS");
    if let Some(rps) = env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = env_parse("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = env_parse("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(per_ip) = env_parse("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = per_ip;
    }

    Ok(config)
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// Missing variables fall back to defaults. The assistants file named by
    /// `ASSISTANTS_PATH` is loaded and the result is validated.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }
}
