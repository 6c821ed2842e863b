use common::domain::{
    DomainError, DomainResult, EventEnvelope, EventHubClient, PartitionReceiver, ReceiveOptions,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What receiver tasks push into the pool's sink
#[derive(Debug)]
pub enum ReceiverEvent {
    Message(EventEnvelope),
    Error {
        partition_id: String,
        error: DomainError,
    },
}

pub type ReceiverSink = mpsc::UnboundedSender<ReceiverEvent>;

/// Handle to one spawned partition receiver task.
pub struct ReceiverHandle {
    name: String,
    partition_id: String,
    is_open: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
    join_handle: Option<JoinHandle<DomainResult<()>>>,
}

impl ReceiverHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Cancel the receiver and wait for it to close. Stopping an already
    /// stopped handle returns `Ok` without touching the receiver.
    pub async fn stop(&mut self, timeout: Duration) -> DomainResult<()> {
        let Some(mut join_handle) = self.join_handle.take() else {
            return Ok(());
        };

        if self.is_open() {
            self.cancellation_token.cancel();
        } else {
            debug!(receiver = %self.name, "receiver already closed itself");
        }

        match tokio::time::timeout(timeout, &mut join_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DomainError::ReceiverStop {
                receiver: self.name.clone(),
                reason: format!("receiver task panicked: {}", e),
            }),
            Err(_) => {
                join_handle.abort();
                self.is_open.store(false, Ordering::SeqCst);
                Err(DomainError::ReceiverStop {
                    receiver: self.name.clone(),
                    reason: format!("did not close within {:?}", timeout),
                })
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StopSummary {
    pub stopped: usize,
    pub failures: Vec<DomainError>,
}

impl StopSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One receiver per partition, all feeding a single sink.
pub struct PartitionReceiverPool {
    receivers: Vec<ReceiverHandle>,
    stop_timeout: Duration,
}

impl PartitionReceiverPool {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            receivers: Vec::new(),
            stop_timeout,
        }
    }

    pub fn receivers(&self) -> &[ReceiverHandle] {
        &self.receivers
    }

    pub fn open_count(&self) -> usize {
        self.receivers.iter().filter(|r| r.is_open()).count()
    }

    /// Open a receiver on every partition. Partitions that fail to attach
    /// are logged and skipped; the call fails only when none attach.
    /// Receivers left over from a previous attach are stopped first.
    pub async fn attach(
        &mut self,
        client: &dyn EventHubClient,
        bus_path: &str,
        consumer_group: &str,
        partition_ids: &[String],
        sink: ReceiverSink,
        options: &ReceiveOptions,
    ) -> DomainResult<&[ReceiverHandle]> {
        if !self.receivers.is_empty() {
            warn!(
                count = self.receivers.len(),
                "stopping receivers left over from a previous attach"
            );
            self.stop_all().await;
        }

        let mut last_error = None;
        for partition_id in partition_ids {
            let name = format!("{}_{}", bus_path, partition_id);
            match client
                .create_receiver(consumer_group, partition_id, options)
                .await
            {
                Ok(receiver) => {
                    debug!(receiver = %name, "receiver attached");
                    self.receivers
                        .push(spawn_receiver(name, receiver, sink.clone(), options));
                }
                Err(e) => {
                    error!(receiver = %name, error = %e, "failed to attach receiver");
                    last_error = Some(e);
                }
            }
        }

        if self.receivers.is_empty() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no partitions to attach".to_string());
            return Err(DomainError::Transport(format!(
                "no receiver could be attached on {}: {}",
                bus_path, reason
            )));
        }

        info!(
            bus_path = %bus_path,
            consumer_group = %consumer_group,
            attached = self.receivers.len(),
            requested = partition_ids.len(),
            "partition receivers attached"
        );
        Ok(&self.receivers)
    }

    /// Stop every receiver concurrently and forget them. Safe to call
    /// repeatedly; failures are logged and reported, never raised.
    pub async fn stop_all(&mut self) -> StopSummary {
        let timeout = self.stop_timeout;
        let mut receivers = std::mem::take(&mut self.receivers);
        let results = join_all(receivers.iter_mut().map(|r| r.stop(timeout))).await;

        let mut summary = StopSummary::default();
        for result in results {
            match result {
                Ok(()) => summary.stopped += 1,
                Err(e) => {
                    error!(error = %e, "error stopping receiver");
                    summary.failures.push(e);
                }
            }
        }

        if !receivers.is_empty() {
            debug!(
                stopped = summary.stopped,
                failed = summary.failures.len(),
                "receivers stopped"
            );
        }
        summary
    }
}

fn spawn_receiver(
    name: String,
    receiver: Box<dyn PartitionReceiver>,
    sink: ReceiverSink,
    options: &ReceiveOptions,
) -> ReceiverHandle {
    let partition_id = receiver.partition_id().to_string();
    let is_open = Arc::new(AtomicBool::new(true));
    let cancellation_token = CancellationToken::new();

    let join_handle = tokio::spawn(run_receiver(
        name.clone(),
        receiver,
        sink,
        cancellation_token.clone(),
        options.max_lifetime,
        is_open.clone(),
    ));

    ReceiverHandle {
        name,
        partition_id,
        is_open,
        cancellation_token,
        join_handle: Some(join_handle),
    }
}

async fn run_receiver(
    name: String,
    mut receiver: Box<dyn PartitionReceiver>,
    sink: ReceiverSink,
    cancellation_token: CancellationToken,
    max_lifetime: Duration,
    is_open: Arc<AtomicBool>,
) -> DomainResult<()> {
    let deadline = tokio::time::sleep(max_lifetime);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                debug!(receiver = %name, "receiver cancelled");
                break;
            }
            _ = &mut deadline => {
                warn!(receiver = %name, "receiver reached its max lifetime, closing");
                break;
            }
            next = receiver.receive() => match next {
                Some(Ok(envelope)) => {
                    if sink.send(ReceiverEvent::Message(envelope)).is_err() {
                        debug!(receiver = %name, "sink dropped, closing receiver");
                        break;
                    }
                }
                Some(Err(error)) => {
                    warn!(receiver = %name, error = %error, "receiver error");
                    let event = ReceiverEvent::Error {
                        partition_id: receiver.partition_id().to_string(),
                        error,
                    };
                    if sink.send(event).is_err() {
                        break;
                    }
                }
                None => {
                    debug!(receiver = %name, "partition stream ended");
                    break;
                }
            }
        }
    }

    let closed = receiver.close().await;
    is_open.store(false, Ordering::SeqCst);
    closed.map_err(|e| DomainError::ReceiverStop {
        receiver: name,
        reason: e.to_string(),
    })
}
