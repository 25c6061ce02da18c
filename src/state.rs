//! Shared application state
//!
//! Holds the loaded configuration, the collaborators every relay session is
//! built from, and WebSocket connection accounting for the connection limit
//! middleware.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use url::Url;

use crate::config::ServerConfig;
use crate::core::assistant::AssistantRegistry;
use crate::core::llm::OpenAIChatFactory;
use crate::core::tools::WebhookToolExecutorFactory;
use crate::handlers::relay::SessionServices;

/// Why a WebSocket connection slot could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP WebSocket connection limit reached")]
    PerIpLimitReached,
}

/// Application state shared by every router
pub struct AppState {
    pub config: ServerConfig,
    /// Collaborators handed to each relay session
    pub services: Arc<SessionServices>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build state with the OpenAI-compatible model backend and webhook tools.
    ///
    /// # Errors
    /// Fails when the tool webhook URL is invalid or the HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let registry = AssistantRegistry::new(config.assistants.clone());
        tracing::info!(assistants = registry.len(), "Assistants loaded");

        let models = OpenAIChatFactory::new(config.openai_config())?;
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; call setup will fail until it is configured");
        }

        let webhook_url = config
            .tool_webhook_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid tool webhook URL: {e}"))?;
        let tools = WebhookToolExecutorFactory::new(webhook_url, config.tool_timeout());

        let services = SessionServices {
            assistants: Arc::new(registry),
            models: Arc::new(models),
            tools: Arc::new(tools),
            silence: config.silence_config(),
        };

        Ok(Self::with_services(config, services))
    }

    /// Build state around caller-supplied session collaborators.
    pub fn with_services(config: ServerConfig, services: SessionServices) -> Arc<Self> {
        Arc::new(Self {
            config,
            services: Arc::new(services),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a WebSocket slot for `ip`, enforcing the global and per-IP limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            self.ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                })
                .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
        if *per_ip >= self.config.max_connections_per_ip {
            drop(per_ip);
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }

        *per_ip += 1;
        Ok(())
    }

    /// Return a slot taken by [`AppState::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let removed = self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
        if removed.is_none() && !self.ip_connections.contains_key(&ip) {
            tracing::warn!(ip = %ip, "Released a connection that was never acquired");
            return;
        }

        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}
