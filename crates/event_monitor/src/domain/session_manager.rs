use common::domain::{
    DomainError, DomainResult, EventHubClient, EventHubConnector, EventPosition, MonitorBatch,
    MonitorParams, ReceiveOptions,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{EnvelopeCollector, EventMonitorConfig, PartitionReceiverPool, ReceiverEvent};

/// The live connection and receivers behind a monitor session.
struct MonitorSession {
    connection_string: String,
    client: Arc<dyn EventHubClient>,
    pool: PartitionReceiverPool,
}

impl MonitorSession {
    async fn close(mut self) {
        let summary = self.pool.stop_all().await;
        if !summary.is_clean() {
            warn!(
                failed = summary.failures.len(),
                "some receivers did not stop cleanly"
            );
        }
        if let Err(e) = self.client.close().await {
            warn!(error = %e, "error closing event hub client");
        }
    }
}

/// Owns the single monitor session of the process.
///
/// Calls are serialised by an async mutex so that at most one set of
/// receivers is open at any time. A call with a new connection string
/// replaces the session; a call with the same one reuses its client.
pub struct SessionManager {
    connector: Arc<dyn EventHubConnector>,
    config: EventMonitorConfig,
    session: Mutex<Option<MonitorSession>>,
    window_token: Mutex<CancellationToken>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn EventHubConnector>, config: EventMonitorConfig) -> Self {
        Self {
            connector,
            config,
            session: Mutex::new(None),
            window_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &EventMonitorConfig {
        &self.config
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Number of receivers currently holding a partition open.
    pub async fn open_receivers(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.pool.open_count())
            .unwrap_or(0)
    }

    /// Collect the target device's messages for one monitor window.
    #[instrument(
        skip(self, params),
        fields(device_id = %params.device_id, consumer_group = %params.consumer_group)
    )]
    pub async fn monitor(&self, params: &MonitorParams) -> DomainResult<MonitorBatch> {
        let event_position = params.event_position()?;
        // Armed before connecting so a stop issued meanwhile still applies
        let window_token = self.arm_window().await;
        let mut guard = self.session.lock().await;

        let reusable = guard
            .as_ref()
            .is_some_and(|s| s.connection_string == params.connection_string);
        if !reusable {
            if let Some(previous) = guard.take() {
                info!("connection string changed, closing previous session");
                previous.close().await;
            }
            let client = self
                .connector
                .connect(&params.connection_string)
                .await
                .map_err(as_transport)?;
            *guard = Some(MonitorSession {
                connection_string: params.connection_string.clone(),
                client,
                pool: PartitionReceiverPool::new(self.config.receiver_stop_timeout()),
            });
        }

        let Some(session) = guard.as_mut() else {
            return Err(DomainError::Transport(
                "monitor session is not available".to_string(),
            ));
        };

        let result = self
            .collect(session, params, event_position, window_token)
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "monitor failed, discarding session");
            if let Some(failed) = guard.take() {
                failed.close().await;
            }
        }
        result
    }

    /// Stop the current session. Also cuts short a window in progress.
    /// A no-op when there is no session.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.window_token.lock().await.cancel();

        let mut guard = self.session.lock().await;
        match guard.take() {
            Some(session) => {
                session.close().await;
                info!("monitor session stopped");
            }
            None => debug!("no monitor session to stop"),
        }
    }

    async fn collect(
        &self,
        session: &mut MonitorSession,
        params: &MonitorParams,
        event_position: EventPosition,
        window_token: CancellationToken,
    ) -> DomainResult<MonitorBatch> {
        let info = session
            .client
            .runtime_info()
            .await
            .map_err(as_transport)?;
        if info.partition_ids.is_empty() {
            warn!(bus_path = %info.path, "event hub has no partitions");
            return Ok(MonitorBatch::no_partitions());
        }

        if window_token.is_cancelled() {
            debug!("stopped before receivers attached");
            return Ok(MonitorBatch::collected(Vec::new()));
        }

        let (sink, mut events) = mpsc::unbounded_channel();
        let options = ReceiveOptions {
            event_position,
            max_lifetime: self.config.receiver_max_lifetime(),
        };
        session
            .pool
            .attach(
                session.client.as_ref(),
                &info.path,
                &params.consumer_group,
                &info.partition_ids,
                sink,
                &options,
            )
            .await?;

        let mut collector = EnvelopeCollector::new(params);
        let deadline = tokio::time::sleep(self.config.monitor_window());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = window_token.cancelled() => {
                    debug!("monitor window cut short by stop");
                    break;
                }
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Some(ReceiverEvent::Message(envelope)) => {
                        collector.accept(envelope);
                    }
                    Some(ReceiverEvent::Error { partition_id, error }) => {
                        warn!(partition_id = %partition_id, error = %error, "receiver reported an error");
                    }
                    None => {
                        debug!("all receivers ended before the window closed");
                        break;
                    }
                },
            }
        }

        session.pool.stop_all().await;

        // Envelopes queued before the receivers stopped still count
        events.close();
        while let Ok(event) = events.try_recv() {
            if let ReceiverEvent::Message(envelope) = event {
                collector.accept(envelope);
            }
        }

        info!(
            collected = collector.len(),
            skipped = collector.skipped(),
            "monitor window closed"
        );
        Ok(MonitorBatch::collected(collector.into_messages()))
    }

    /// Calls waiting on the session share one token until a stop cancels it.
    async fn arm_window(&self) -> CancellationToken {
        let mut current = self.window_token.lock().await;
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.clone()
    }
}

fn as_transport(error: DomainError) -> DomainError {
    match error {
        e @ (DomainError::Transport(_) | DomainError::InvalidConnectionString(_)) => e,
        other => DomainError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockEventHubClient, MockEventHubConnector};

    #[tokio::test]
    async fn test_invalid_connection_string_is_not_reported_as_transport() {
        let mut connector = MockEventHubConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            Err(DomainError::InvalidConnectionString(
                "missing EntityPath".to_string(),
            ))
        });

        let manager = SessionManager::new(Arc::new(connector), EventMonitorConfig::default());
        let err = manager
            .monitor(&MonitorParams::new("Endpoint=nats://h:4222", "dev-1"))
            .await
            .unwrap_err();

        assert!(err.is_invalid_input());
        assert!(!manager.has_session().await);
    }

    #[tokio::test]
    async fn test_unexpected_client_error_becomes_transport() {
        let mut client = MockEventHubClient::new();
        client
            .expect_runtime_info()
            .returning(|| Err(DomainError::Unexpected(anyhow::anyhow!("boom"))));
        client.expect_close().times(1).returning(|| Ok(()));
        let client: Arc<dyn EventHubClient> = Arc::new(client);

        let mut connector = MockEventHubConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(client.clone()));

        let manager = SessionManager::new(Arc::new(connector), EventMonitorConfig::default());
        let err = manager
            .monitor(&MonitorParams::new("cs", "dev-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Transport(ref reason) if reason.contains("boom")));
        assert!(!manager.has_session().await);
    }
}
