use crate::domain::result::DomainResult;
use crate::domain::MessageBody;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Body of an envelope before any console-side decoding
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Bytes(Vec<u8>),
    Json(Value),
}

impl From<EnvelopeBody> for MessageBody {
    fn from(body: EnvelopeBody) -> Self {
        match body {
            EnvelopeBody::Bytes(data) => MessageBody::RawBuffer(data),
            EnvelopeBody::Json(value) => MessageBody::Passthrough(value),
        }
    }
}

/// Raw message as delivered by the bus transport
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub partition_id: String,
    pub body: Option<EnvelopeBody>,
    pub enqueued_time_utc: DateTime<Utc>,
    pub application_properties: Map<String, Value>,
    pub annotations: Map<String, Value>,
}

impl EventEnvelope {
    pub fn annotation_str(&self, key: &str) -> Option<&str> {
        self.annotations.get(key)?.as_str()
    }
}

/// Metadata about the event hub behind a client connection
#[derive(Debug, Clone, PartialEq)]
pub struct HubRuntimeInfo {
    pub path: String,
    pub partition_ids: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Cursor a receiver starts reading from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPosition {
    enqueued_time: DateTime<Utc>,
}

impl EventPosition {
    pub fn from_enqueued_time(enqueued_time: DateTime<Utc>) -> Self {
        Self { enqueued_time }
    }

    pub fn now() -> Self {
        Self::from_enqueued_time(Utc::now())
    }

    pub fn enqueued_time(&self) -> DateTime<Utc> {
        self.enqueued_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveOptions {
    pub event_position: EventPosition,
    /// Hard upper bound on how long a receiver stays open
    pub max_lifetime: Duration,
}

/// Opens bus clients from connection strings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventHubConnector: Send + Sync {
    async fn connect(&self, connection_string: &str) -> DomainResult<Arc<dyn EventHubClient>>;
}

/// A connection to one event hub
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventHubClient: Send + Sync {
    /// Hub path and partition ids
    async fn runtime_info(&self) -> DomainResult<HubRuntimeInfo>;

    /// Open a receiver on one partition for the given consumer group
    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition_id: &str,
        options: &ReceiveOptions,
    ) -> DomainResult<Box<dyn PartitionReceiver>>;

    async fn close(&self) -> DomainResult<()>;
}

/// Pull side of a single partition
#[async_trait]
pub trait PartitionReceiver: Send {
    fn partition_id(&self) -> &str;

    /// Next envelope, or `None` once the partition stream has ended
    async fn receive(&mut self) -> Option<DomainResult<EventEnvelope>>;

    async fn close(&mut self) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_body_maps_to_message_body() {
        assert_eq!(
            MessageBody::from(EnvelopeBody::Bytes(vec![1, 2])),
            MessageBody::RawBuffer(vec![1, 2])
        );
        assert_eq!(
            MessageBody::from(EnvelopeBody::Json(json!({"a": 1}))),
            MessageBody::Passthrough(json!({"a": 1}))
        );
    }

    #[test]
    fn test_annotation_str_ignores_non_strings() {
        let envelope = EventEnvelope {
            partition_id: "0".to_string(),
            body: None,
            enqueued_time_utc: Utc::now(),
            application_properties: Map::new(),
            annotations: json!({"iothub-connection-device-id": "dev-1", "x-opt-sequence-number": 4})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(
            envelope.annotation_str("iothub-connection-device-id"),
            Some("dev-1")
        );
        assert_eq!(envelope.annotation_str("x-opt-sequence-number"), None);
    }
}
