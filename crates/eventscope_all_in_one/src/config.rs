use config::{Config, ConfigError, Environment};
use event_monitor::domain::EventMonitorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Comma separated list of allowed origins, `*` for any
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: String,

    // Monitor configuration
    /// How long one monitor call collects messages, in milliseconds
    #[serde(default = "default_monitor_window_ms")]
    pub monitor_window_ms: u64,

    /// Upper bound on stopping a single partition receiver, in milliseconds
    #[serde(default = "default_receiver_stop_timeout_ms")]
    pub receiver_stop_timeout_ms: u64,

    /// Extra time a receiver may outlive its window before closing itself
    #[serde(default = "default_receiver_lifetime_grace_ms")]
    pub receiver_lifetime_grace_ms: u64,

    #[serde(default = "default_bus_connect_timeout_secs")]
    pub bus_connect_timeout_secs: u64,

    /// Time allowed for closers on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    // Telemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8081
}

fn default_cors_allowed_origins() -> String {
    "*".to_string()
}

fn default_monitor_window_ms() -> u64 {
    5_000
}

fn default_receiver_stop_timeout_ms() -> u64 {
    5_000
}

fn default_receiver_lifetime_grace_ms() -> u64 {
    10_000
}

fn default_bus_connect_timeout_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    15
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "eventscope".to_string()
}

impl ServiceConfig {
    /// Load configuration from `EVENTSCOPE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("EVENTSCOPE"))
            .build()?;

        config.try_deserialize()
    }

    pub fn event_monitor_config(&self) -> EventMonitorConfig {
        EventMonitorConfig {
            monitor_window_ms: self.monitor_window_ms,
            receiver_stop_timeout_ms: self.receiver_stop_timeout_ms,
            receiver_lifetime_grace_ms: self.receiver_lifetime_grace_ms,
        }
    }

    pub fn bus_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.bus_connect_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
