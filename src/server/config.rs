//! Server configuration types
//!
//! Contains all configuration structures for the PS3 server.

use crate::middleware::rate_limit::RateLimitSettings;
use ps3_core::{Error, EventBusConfig, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub event_bus: EventBusSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.event_bus.history_capacity == 0 {
            return Err(invalid("event_bus.history_capacity", "must be at least 1"));
        }
        if self.event_bus.subscriber_capacity == 0 {
            return Err(invalid("event_bus.subscriber_capacity", "must be at least 1"));
        }
        if self.event_bus.heartbeat_secs == 0 {
            return Err(invalid("event_bus.heartbeat_secs", "must be at least 1"));
        }
        if self.event_bus.sweep_interval_secs == 0 {
            return Err(invalid("event_bus.sweep_interval_secs", "must be at least 1"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(invalid("server.max_upload_bytes", "must be at least 1"));
        }
        self.rate_limit.validate()
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// HTTP listener and access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Bearer token for protected routes. Empty or absent disables auth.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl ServerConfig {
    /// Configured API key, if auth is enabled
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            api_key: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusSettings {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// How long an idle task keeps its history after the last subscriber leaves
    #[serde(default = "default_history_retention_secs")]
    pub history_retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_history_capacity() -> usize {
    ps3_core::event_bus::DEFAULT_HISTORY_CAPACITY
}
fn default_subscriber_capacity() -> usize {
    ps3_core::event_bus::DEFAULT_SUBSCRIBER_CAPACITY
}
fn default_heartbeat_secs() -> u64 {
    ps3_core::event_bus::DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}
fn default_history_retention_secs() -> u64 {
    ps3_core::event_bus::DEFAULT_HISTORY_RETENTION.as_secs()
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl EventBusSettings {
    /// Build the core bus configuration
    pub fn bus_config(&self) -> EventBusConfig {
        EventBusConfig::default()
            .with_history_capacity(self.history_capacity)
            .with_subscriber_capacity(self.subscriber_capacity)
            .with_history_retention(Duration::from_secs(self.history_retention_secs))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
            history_retention_secs: default_history_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
