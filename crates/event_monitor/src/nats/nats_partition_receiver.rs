use async_nats::jetstream::{self, consumer::pull};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, EventEnvelope, PartitionReceiver};
use futures::StreamExt;
use tracing::debug;

use super::envelope_from_jetstream;

/// Ephemeral pull consumer bound to one partition subject.
pub struct NatsPartitionReceiver {
    partition_id: String,
    jetstream: jetstream::Context,
    stream_name: String,
    consumer_name: String,
    messages: Option<pull::Stream>,
}

impl NatsPartitionReceiver {
    pub fn new(
        partition_id: impl Into<String>,
        jetstream: jetstream::Context,
        stream_name: impl Into<String>,
        consumer_name: impl Into<String>,
        messages: pull::Stream,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            jetstream,
            stream_name: stream_name.into(),
            consumer_name: consumer_name.into(),
            messages: Some(messages),
        }
    }
}

#[async_trait]
impl PartitionReceiver for NatsPartitionReceiver {
    fn partition_id(&self) -> &str {
        &self.partition_id
    }

    async fn receive(&mut self) -> Option<DomainResult<EventEnvelope>> {
        let messages = self.messages.as_mut()?;
        let next = messages.next().await?;
        Some(
            next.map(|message| envelope_from_jetstream(&self.partition_id, &message))
                .map_err(|e| DomainError::Transport(format!("pull failed: {}", e))),
        )
    }

    async fn close(&mut self) -> DomainResult<()> {
        // Dropping the stream ends the pull requests
        if self.messages.take().is_none() {
            return Ok(());
        }
        self.jetstream
            .delete_consumer_from_stream(&self.consumer_name, &self.stream_name)
            .await
            .map_err(|e| {
                DomainError::Transport(format!(
                    "failed to delete consumer {}: {}",
                    self.consumer_name, e
                ))
            })?;
        debug!(consumer = %self.consumer_name, "consumer deleted");
        Ok(())
    }
}
