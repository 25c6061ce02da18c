//! Overlay of YAML values on the environment-derived configuration.

use std::path::PathBuf;

use crate::core::assistant::AssistantRegistry;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Merge a YAML configuration over environment variables.
///
/// YAML values win wherever they are present. Assistants defined inline come
/// first, followed by those read from the assistants file.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }

    if let Some(path) = config.assistants_path.clone() {
        let loaded = AssistantRegistry::load_file(&path)?;
        config.assistants.extend(loaded);
    }

    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> Result<(), String> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(domain) = server.domain {
            config.server_domain = Some(domain);
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(true) => {
                    let cert_path = tls
                        .cert_path
                        .ok_or("server.tls.enabled is true but cert_path is missing")?;
                    let key_path = tls
                        .key_path
                        .ok_or("server.tls.enabled is true but key_path is missing")?;
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert_path),
                        key_path: PathBuf::from(key_path),
                    });
                }
                Some(false) => config.tls = None,
                None => {}
            }
        }
    }

    if let Some(openai) = yaml.openai {
        if let Some(api_key) = openai.api_key {
            config.openai_api_key = Some(api_key);
        }
        if let Some(base_url) = openai.base_url {
            config.openai_base_url = base_url;
        }
        if let Some(model) = openai.model {
            config.openai_model = model;
        }
        if let Some(temperature) = openai.temperature {
            config.openai_temperature = Some(temperature);
        }
    }

    if let Some(silence) = yaml.silence {
        if let Some(threshold) = silence.threshold_seconds {
            config.silence_threshold_seconds = threshold;
        }
        if let Some(retries) = silence.max_retries {
            config.silence_max_retries = retries;
        }
        if let Some(text) = silence.reminder_text {
            config.silence_reminder_text = text;
        }
    }

    if let Some(timeout) = yaml.session.and_then(|s| s.setup_timeout_seconds) {
        config.setup_timeout_seconds = timeout;
    }

    if let Some(tools) = yaml.tools {
        if let Some(url) = tools.webhook_url {
            config.tool_webhook_url = Some(url);
        }
        if let Some(timeout) = tools.timeout_seconds {
            config.tool_timeout_seconds = timeout;
        }
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = security.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if let Some(max) = security.max_websocket_connections {
            config.max_websocket_connections = Some(max);
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    if let Some(assistants) = yaml.assistants {
        config.assistants = assistants;
    }
    if let Some(path) = yaml.assistants_path {
        config.assistants_path = Some(PathBuf::from(path));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_merge_without_yaml_uses_env_defaults() {
        unsafe {
            std::env::remove_var("ASSISTANTS_PATH");
            std::env::remove_var("HOST");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.assistants.is_empty());
    }

    #[test]
    fn test_apply_yaml_tls_requires_key() {
        let yaml: YamlConfig = serde_yaml::from_str(
            r#"
server:
  tls:
    enabled: true
    cert_path: "/certs/cert.pem"
"#,
        )
        .unwrap();

        let mut config = ServerConfig::default();
        let err = apply_yaml(&mut config, yaml).unwrap_err();
        assert!(err.contains("key_path"));
    }

    #[test]
    fn test_apply_yaml_overrides_only_present_values() {
        let yaml: YamlConfig = serde_yaml::from_str(
            r#"
silence:
  max_retries: 1
tools:
  webhook_url: "https://tools.example.com"
"#,
        )
        .unwrap();

        let mut config = ServerConfig::default();
        config.silence_threshold_seconds = 9;
        apply_yaml(&mut config, yaml).unwrap();

        assert_eq!(config.silence_threshold_seconds, 9);
        assert_eq!(config.silence_max_retries, 1);
        assert_eq!(
            config.tool_webhook_url.as_deref(),
            Some("https://tools.example.com")
        );
    }
}
