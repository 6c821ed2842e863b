use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Well-known annotation keys stamped on envelopes by the device message bus.
pub mod annotations {
    pub const DEVICE_ID: &str = "iothub-connection-device-id";
    pub const MODULE_ID: &str = "iothub-connection-module-id";
    pub const MESSAGE_SOURCE: &str = "iothub-message-source";
    pub const COMPONENT_NAME: &str = "iothub-component-name";
    pub const INTERFACE_ID: &str = "iothub-interface-id";
    pub const ENQUEUED_TIME: &str = "iothub-enqueuedtime";
    pub const SEQUENCE_NUMBER: &str = "x-opt-sequence-number";
    pub const X_OPT_ENQUEUED_TIME: &str = "x-opt-enqueued-time";

    /// Header prefixes that mark a header as bus-assigned metadata.
    pub const PREFIXES: [&str; 3] = ["iothub-", "x-opt-", "dt-"];

    pub fn is_annotation(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        PREFIXES.iter().any(|prefix| key.starts_with(prefix))
    }
}

/// Tag used on the wire for raw byte buffers: `{"type":"Buffer","data":[...]}`
pub const BUFFER_TAG: &str = "Buffer";

/// Payload of a telemetry message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Undecoded bytes as delivered by the bus
    RawBuffer(Vec<u8>),
    /// Structure produced by decoding a raw buffer
    Decoded(Value),
    /// Already-structured value, returned untouched
    Passthrough(Value),
}

impl MessageBody {
    /// Interpret a JSON value, recognising the tagged raw buffer shape.
    pub fn from_json(value: Value) -> Self {
        match raw_buffer_bytes(&value) {
            Some(data) => MessageBody::RawBuffer(data),
            None => MessageBody::Passthrough(value),
        }
    }

    pub fn as_raw_buffer(&self) -> Option<&[u8]> {
        match self {
            MessageBody::RawBuffer(data) => Some(data),
            _ => None,
        }
    }
}

fn raw_buffer_bytes(value: &Value) -> Option<Vec<u8>> {
    let object = value.as_object()?;
    if object.get("type")?.as_str()? != BUFFER_TAG {
        return None;
    }
    object
        .get("data")?
        .as_array()?
        .iter()
        .map(|byte| byte.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

impl Serialize for MessageBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MessageBody::RawBuffer(data) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", BUFFER_TAG)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            MessageBody::Decoded(value) | MessageBody::Passthrough(value) => {
                value.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for MessageBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(MessageBody::from_json)
    }
}

/// A single telemetry message as returned to the console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MessageBody>,
    pub enqueued_time: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_properties: Option<Map<String, Value>>,
}

impl Message {
    pub fn system_property(&self, key: &str) -> Option<&str> {
        self.system_properties.as_ref()?.get(key)?.as_str()
    }

    pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.enqueued_time)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Compare by enqueued time. Falls back to comparing the raw strings
    /// when either side is not RFC 3339.
    pub fn cmp_enqueued(&self, other: &Message) -> Ordering {
        match (self.enqueued_at(), other.enqueued_at()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.enqueued_time.cmp(&other.enqueued_time),
        }
    }

    pub fn is_newer_than(&self, other: &Message) -> bool {
        self.cmp_enqueued(other) == Ordering::Greater
    }
}

/// Format a timestamp the way enqueued times are carried on messages.
pub fn format_enqueued_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
