use chrono::{DateTime, Utc};
use crate::domain::{DomainError, DomainResult, EventPosition, Message};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

/// Response header carrying the [`BatchStatus`] of a monitor call
pub const BATCH_STATUS_HEADER: &str = "x-eventscope-batch-status";

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_string()
}

/// One monitor request as sent by the console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorParams {
    pub connection_string: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    /// RFC 3339; absent means "from now"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub fetch_system_properties: bool,
}

impl MonitorParams {
    pub fn new(connection_string: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            consumer_group: default_consumer_group(),
            device_id: device_id.into(),
            module_id: None,
            start_time: None,
            fetch_system_properties: false,
        }
    }

    pub fn event_position(&self) -> DomainResult<EventPosition> {
        match self.start_time.as_deref().map(str::trim) {
            None | Some("") => Ok(EventPosition::now()),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|time| EventPosition::from_enqueued_time(time.with_timezone(&Utc)))
                .map_err(|e| DomainError::InvalidStartTime(format!("{}: {}", raw, e))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Receivers ran for the window; the batch may still be empty
    Collected,
    /// The hub reported no partitions so nothing was attached
    NoPartitions,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Collected => "collected",
            BatchStatus::NoPartitions => "no-partitions",
        }
    }

    /// Unknown or missing values read as `Collected`.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("no-partitions") => BatchStatus::NoPartitions,
            _ => BatchStatus::Collected,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorBatch {
    pub messages: Vec<Message>,
    pub status: BatchStatus,
}

impl MonitorBatch {
    pub fn collected(messages: Vec<Message>) -> Self {
        Self {
            messages,
            status: BatchStatus::Collected,
        }
    }

    pub fn no_partitions() -> Self {
        Self {
            messages: Vec::new(),
            status: BatchStatus::NoPartitions,
        }
    }
}
