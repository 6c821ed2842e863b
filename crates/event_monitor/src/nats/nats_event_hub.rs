use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy},
};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{
    DomainError, DomainResult, EventHubClient, EventHubConnector, HubRuntimeInfo,
    PartitionReceiver, ReceiveOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{offset_to_utc, utc_to_offset, BusConnectionString, NatsPartitionReceiver};

/// Consumers left behind by a crashed process are reaped by the server
/// after this much inactivity past the receiver lifetime.
const CONSUMER_INACTIVE_GRACE: Duration = Duration::from_secs(30);

/// Connects to NATS JetStream. The `EntityPath` names a stream whose
/// subjects are `{EntityPath}.{partition}`.
pub struct NatsEventHubConnector {
    connect_timeout: Duration,
}

impl NatsEventHubConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl EventHubConnector for NatsEventHubConnector {
    async fn connect(&self, connection_string: &str) -> DomainResult<Arc<dyn EventHubClient>> {
        let parsed = BusConnectionString::parse(connection_string)?;
        info!(
            endpoint = %parsed.endpoint,
            entity_path = %parsed.entity_path,
            timeout_ms = self.connect_timeout.as_millis(),
            "connecting to event hub"
        );

        let mut options = async_nats::ConnectOptions::new().connection_timeout(self.connect_timeout);
        if let Some((user, password)) = parsed.credentials() {
            options = options.user_and_password(user.to_string(), password.to_string());
        }

        let client = options.connect(parsed.endpoint.as_str()).await.map_err(|e| {
            DomainError::Transport(format!("failed to connect to {}: {}", parsed.endpoint, e))
        })?;

        info!("connected to event hub");
        Ok(Arc::new(NatsEventHubClient::new(client, parsed.entity_path)))
    }
}

pub struct NatsEventHubClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    entity_path: String,
}

impl NatsEventHubClient {
    pub fn new(client: async_nats::Client, entity_path: impl Into<String>) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            entity_path: entity_path.into(),
        }
    }

    fn partition_subject(&self, partition_id: &str) -> String {
        format!("{}.{}", self.entity_path, partition_id)
    }
}

#[async_trait]
impl EventHubClient for NatsEventHubClient {
    #[instrument(skip(self), fields(entity_path = %self.entity_path))]
    async fn runtime_info(&self) -> DomainResult<HubRuntimeInfo> {
        let mut stream = self
            .jetstream
            .get_stream(&self.entity_path)
            .await
            .map_err(|e| {
                DomainError::Transport(format!("stream {} unavailable: {}", self.entity_path, e))
            })?;
        let info = stream
            .info()
            .await
            .map_err(|e| DomainError::Transport(format!("stream info failed: {}", e)))?;

        let partition_ids = partition_ids_from_subjects(&self.entity_path, &info.config.subjects);
        debug!(partitions = ?partition_ids, "discovered partitions");

        Ok(HubRuntimeInfo {
            path: self.entity_path.clone(),
            partition_ids,
            created_at: offset_to_utc(info.created),
        })
    }

    #[instrument(skip(self, options), fields(entity_path = %self.entity_path))]
    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition_id: &str,
        options: &ReceiveOptions,
    ) -> DomainResult<Box<dyn PartitionReceiver>> {
        let start_time = utc_to_offset(options.event_position.enqueued_time()).ok_or_else(|| {
            DomainError::InvalidStartTime("start time out of range for the bus".to_string())
        })?;
        let consumer_name = consumer_name(consumer_group, partition_id);

        let config = pull::Config {
            name: Some(consumer_name.clone()),
            description: Some(format!("eventscope receiver for {}", consumer_group)),
            filter_subject: self.partition_subject(partition_id),
            deliver_policy: DeliverPolicy::ByStartTime { start_time },
            ack_policy: AckPolicy::None,
            inactive_threshold: options.max_lifetime + CONSUMER_INACTIVE_GRACE,
            ..Default::default()
        };

        let consumer = self
            .jetstream
            .create_consumer_on_stream(config, self.entity_path.as_str())
            .await
            .map_err(|e| DomainError::Transport(format!("failed to create consumer: {}", e)))?;
        let messages = consumer
            .messages()
            .await
            .map_err(|e| DomainError::Transport(format!("failed to start pull: {}", e)))?;

        Ok(Box::new(NatsPartitionReceiver::new(
            partition_id,
            self.jetstream.clone(),
            self.entity_path.clone(),
            consumer_name,
            messages,
        )))
    }

    async fn close(&self) -> DomainResult<()> {
        info!(entity_path = %self.entity_path, "closing event hub connection");
        // The connection itself closes when the last clone is dropped
        self.client
            .flush()
            .await
            .map_err(|e| DomainError::Transport(format!("flush failed: {}", e)))
    }
}

/// `telemetry.0`, `telemetry.1` → `["0", "1"]`. Wildcard subjects carry
/// no fixed partition and are ignored.
pub fn partition_ids_from_subjects(entity_path: &str, subjects: &[String]) -> Vec<String> {
    let prefix = format!("{}.", entity_path);
    subjects
        .iter()
        .filter_map(|subject| subject.strip_prefix(&prefix))
        .filter(|partition| !partition.is_empty() && !partition.contains(['*', '>', '.']))
        .map(str::to_string)
        .collect()
}

/// Server-side consumer names only allow a restricted character set and
/// must be unique per receiver, so each one carries a timestamp.
fn consumer_name(consumer_group: &str, partition_id: &str) -> String {
    let group: String = consumer_group
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "eventscope-{}-{}-{}",
        group.trim_start_matches('_'),
        partition_id,
        Utc::now().timestamp_micros()
    )
}
