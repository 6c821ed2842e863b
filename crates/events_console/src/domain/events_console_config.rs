use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConsoleConfig {
    /// Base URL of the eventscope proxy (default: http://localhost:8081)
    pub proxy_base_url: String,

    /// Delay between consecutive monitor calls (default: 5000 ms)
    pub poll_interval_ms: u64,

    /// Must exceed the proxy's monitor window (default: 30 seconds)
    pub request_timeout_secs: u64,
}

impl Default for EventsConsoleConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: "http://localhost:8081".to_string(),
            poll_interval_ms: 5_000,
            request_timeout_secs: 30,
        }
    }
}

impl EventsConsoleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
