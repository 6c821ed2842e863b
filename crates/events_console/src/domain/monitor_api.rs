use async_trait::async_trait;
use common::domain::{MonitorBatch, MonitorParams};

use super::ConsoleResult;

/// The proxy's monitor endpoints
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MonitorApi: Send + Sync {
    async fn monitor(&self, params: &MonitorParams) -> ConsoleResult<MonitorBatch>;
    async fn stop(&self) -> ConsoleResult<()>;
}
