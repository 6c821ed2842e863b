use chrono::{DateTime, Utc};
use common::domain::{format_enqueued_time, MonitorParams};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{EventMonitoringStateMachine, StartOutcome};

/// Re-issues `start` while the previous one reached `Fetched`.
///
/// Each poll resumes from the newest message seen so far, or from when
/// the previous poll was issued if it brought nothing new.
pub struct MonitorPoller {
    machine: Arc<EventMonitoringStateMachine>,
    cancellation_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl MonitorPoller {
    pub fn start(
        machine: Arc<EventMonitoringStateMachine>,
        params: MonitorParams,
        interval: Duration,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let join_handle = tokio::spawn(poll_loop(
            machine.clone(),
            params,
            interval,
            cancellation_token.clone(),
        ));
        Self {
            machine,
            cancellation_token,
            join_handle: Some(join_handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the loop and stop the proxy session. The loop has ended
    /// before the stop call goes out, so no monitor call follows it; a
    /// call in flight at that point is dropped.
    pub async fn stop(mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.join_handle.take() {
            join_loop(handle).await;
        }
        self.machine.stop().await;
    }

    /// Wait for the loop to end on its own, e.g. after a failed poll.
    pub async fn finished(mut self) {
        if let Some(handle) = self.join_handle.take() {
            join_loop(handle).await;
        }
    }
}

async fn join_loop(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "events poll task failed");
    }
}

async fn poll_loop(
    machine: Arc<EventMonitoringStateMachine>,
    mut params: MonitorParams,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    loop {
        let issued_at = Utc::now();
        let outcome = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            outcome = machine.start(&params) => outcome,
        };
        let added = match outcome {
            StartOutcome::Fetched { added } => added,
            StartOutcome::Failed | StartOutcome::Discarded => {
                debug!(?outcome, "poll loop ending");
                break;
            }
        };

        let newest = machine
            .state()
            .message
            .first()
            .map(|m| m.enqueued_time.clone());
        params.start_time = Some(next_start_time(added, newest, issued_at));

        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!("events poll loop stopped");
}

fn next_start_time(added: usize, newest: Option<String>, issued_at: DateTime<Utc>) -> String {
    match newest {
        Some(enqueued_time) if added > 0 => enqueued_time,
        _ => format_enqueued_time(issued_at),
    }
}
