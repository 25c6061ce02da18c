//! Checks run on the fully merged configuration.

use std::collections::HashSet;

use url::Url;

use super::ServerConfig;

/// Validate a merged configuration.
///
/// # Errors
/// Returns a message naming the first offending setting.
pub(super) fn validate_config(config: &ServerConfig) -> Result<(), String> {
    validate_timing(config)?;
    validate_urls(config)?;
    validate_tls(config)?;
    validate_assistants(config)?;

    if let Some(temperature) = config.openai_temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(format!(
            "openai temperature must be between 0.0 and 2.0, got {temperature}"
        ));
    }

    Ok(())
}

fn validate_timing(config: &ServerConfig) -> Result<(), String> {
    if config.silence_threshold_seconds == 0 {
        return Err("silence threshold_seconds must be greater than zero".to_string());
    }
    if config.setup_timeout_seconds == 0 {
        return Err("setup_timeout_seconds must be greater than zero".to_string());
    }
    if config.tool_timeout_seconds == 0 {
        return Err("tools timeout_seconds must be greater than zero".to_string());
    }
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err("rate limit values must be greater than zero".to_string());
    }
    Ok(())
}

fn validate_urls(config: &ServerConfig) -> Result<(), String> {
    Url::parse(&config.openai_base_url)
        .map_err(|e| format!("Invalid openai base_url '{}': {e}", config.openai_base_url))?;

    if let Some(webhook) = &config.tool_webhook_url {
        Url::parse(webhook)
            .map_err(|e| format!("Invalid tools webhook_url '{webhook}': {e}"))?;
    }

    for assistant in &config.assistants {
        if let Some(webhook) = &assistant.tool_webhook_url {
            Url::parse(webhook).map_err(|e| {
                format!(
                    "Invalid tool_webhook_url '{webhook}' for assistant '{}': {e}",
                    assistant.name
                )
            })?;
        }
    }
    Ok(())
}

fn validate_tls(config: &ServerConfig) -> Result<(), String> {
    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file not found: {}",
                tls.cert_path.display()
            ));
        }
        if !tls.key_path.exists() {
            return Err(format!(
                "TLS private key file not found: {}",
                tls.key_path.display()
            ));
        }
    }
    Ok(())
}

fn validate_assistants(config: &ServerConfig) -> Result<(), String> {
    let mut seen = HashSet::new();
    for assistant in &config.assistants {
        if assistant.name.trim().is_empty() {
            return Err("Assistant name must not be empty".to_string());
        }
        if !seen.insert(assistant.name.as_str()) {
            return Err(format!("Duplicate assistant name: {}", assistant.name));
        }
        if assistant.initial_message.trim().is_empty() {
            return Err(format!(
                "Assistant '{}' has an empty initial_message",
                assistant.name
            ));
        }
        if let Some(manifest) = &assistant.tools {
            let duplicates = manifest.duplicate_names();
            if !duplicates.is_empty() {
                return Err(format!(
                    "Assistant '{}' declares duplicate tools: {}",
                    assistant.name,
                    duplicates.join(", ")
                ));
            }
        }
    }
    Ok(())
}
