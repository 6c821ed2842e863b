use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMonitorConfig {
    /// How long one monitor call collects before returning (default: 5000 ms)
    pub monitor_window_ms: u64,

    /// Upper bound on waiting for a single receiver to close (default: 5000 ms)
    pub receiver_stop_timeout_ms: u64,

    /// Extra lifetime granted to receivers past the window before they
    /// close themselves (default: 10000 ms)
    pub receiver_lifetime_grace_ms: u64,
}

impl Default for EventMonitorConfig {
    fn default() -> Self {
        Self {
            monitor_window_ms: 5_000,
            receiver_stop_timeout_ms: 5_000,
            receiver_lifetime_grace_ms: 10_000,
        }
    }
}

impl EventMonitorConfig {
    pub fn monitor_window(&self) -> Duration {
        Duration::from_millis(self.monitor_window_ms)
    }

    pub fn receiver_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver_stop_timeout_ms)
    }

    /// A receiver whose session is never stopped still closes after this long.
    pub fn receiver_max_lifetime(&self) -> Duration {
        Duration::from_millis(
            self.monitor_window_ms
                .saturating_add(self.receiver_lifetime_grace_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_lifetime_outlives_window() {
        let config = EventMonitorConfig::default();
        assert_eq!(config.monitor_window(), Duration::from_secs(5));
        assert_eq!(config.receiver_max_lifetime(), Duration::from_secs(15));
        assert!(config.receiver_max_lifetime() > config.monitor_window());
    }

    #[test]
    fn test_max_lifetime_saturates_on_huge_values() {
        let config = EventMonitorConfig {
            monitor_window_ms: u64::MAX,
            receiver_lifetime_grace_ms: 1,
            ..Default::default()
        };
        assert_eq!(config.receiver_max_lifetime(), Duration::from_millis(u64::MAX));
    }
}
