use async_nats::jetstream;
use chrono::{DateTime, Utc};
use common::domain::{annotations, format_enqueued_time, EnvelopeBody, EventEnvelope};
use serde_json::{Map, Value};

const CONTENT_TYPE: &str = "content-type";

/// Bus-level facts about a delivered message that are not headers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryInfo {
    pub published: Option<DateTime<Utc>>,
    pub sequence: Option<u64>,
}

pub fn envelope_from_jetstream(partition_id: &str, message: &jetstream::Message) -> EventEnvelope {
    let headers: Vec<(String, String)> = message
        .headers
        .as_ref()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, values)| {
                    values
                        .first()
                        .map(|value| (name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let delivery = match message.info() {
        Ok(info) => DeliveryInfo {
            published: offset_to_utc(info.published),
            sequence: Some(info.stream_sequence),
        },
        Err(_) => DeliveryInfo {
            published: None,
            sequence: None,
        },
    };

    envelope_from_parts(partition_id, &message.payload, headers, delivery)
}

/// Split headers into annotations and application properties and
/// classify the payload.
pub fn envelope_from_parts(
    partition_id: &str,
    payload: &[u8],
    headers: Vec<(String, String)>,
    delivery: DeliveryInfo,
) -> EventEnvelope {
    let mut annotations_map = Map::new();
    let mut application_properties = Map::new();
    let mut content_type = None;

    for (name, value) in headers {
        let lowered = name.to_ascii_lowercase();
        if lowered == CONTENT_TYPE {
            content_type = Some(value);
        } else if annotations::is_annotation(&lowered) {
            annotations_map.insert(lowered, Value::String(value));
        } else {
            application_properties.insert(name, Value::String(value));
        }
    }

    let enqueued_time_utc = delivery
        .published
        .or_else(|| {
            annotations_map
                .get(annotations::ENQUEUED_TIME)
                .and_then(Value::as_str)
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);

    if let Some(sequence) = delivery.sequence {
        annotations_map.insert(annotations::SEQUENCE_NUMBER.to_string(), Value::from(sequence));
    }
    annotations_map.insert(
        annotations::X_OPT_ENQUEUED_TIME.to_string(),
        Value::from(enqueued_time_utc.timestamp_millis()),
    );
    annotations_map
        .entry(annotations::ENQUEUED_TIME)
        .or_insert_with(|| Value::String(format_enqueued_time(enqueued_time_utc)));

    EventEnvelope {
        partition_id: partition_id.to_string(),
        body: classify_body(payload, content_type.as_deref()),
        enqueued_time_utc,
        application_properties,
        annotations: annotations_map,
    }
}

/// JSON objects and arrays arrive structured; anything else stays bytes.
/// An explicit non-JSON content type always keeps the bytes.
fn classify_body(payload: &[u8], content_type: Option<&str>) -> Option<EnvelopeBody> {
    if payload.is_empty() {
        return None;
    }

    let declared_json = content_type.map(|ct| ct.to_ascii_lowercase().contains("json"));
    if declared_json == Some(false) {
        return Some(EnvelopeBody::Bytes(payload.to_vec()));
    }

    match serde_json::from_slice::<Value>(payload) {
        Ok(value) if declared_json == Some(true) || value.is_object() || value.is_array() => {
            Some(EnvelopeBody::Json(value))
        }
        _ => Some(EnvelopeBody::Bytes(payload.to_vec())),
    }
}

pub(crate) fn offset_to_utc(time: time::OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.unix_timestamp(), time.nanosecond())
}

pub(crate) fn utc_to_offset(time: DateTime<Utc>) -> Option<time::OffsetDateTime> {
    let nanos = time.timestamp_nanos_opt()?;
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn delivered_at(seconds: i64) -> DeliveryInfo {
        DeliveryInfo {
            published: Utc.timestamp_opt(seconds, 0).single(),
            sequence: Some(42),
        }
    }

    fn header(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_headers_split_into_annotations_and_properties() {
        let envelope = envelope_from_parts(
            "3",
            b"\x01\x02",
            vec![
                header("iothub-connection-device-id", "dev-1"),
                header("Iothub-Message-Source", "Telemetry"),
                header("temperatureAlert", "true"),
            ],
            delivered_at(1_714_557_600),
        );

        assert_eq!(envelope.partition_id, "3");
        assert_eq!(
            envelope.annotation_str(annotations::DEVICE_ID),
            Some("dev-1")
        );
        assert_eq!(
            envelope.annotation_str(annotations::MESSAGE_SOURCE),
            Some("Telemetry")
        );
        assert_eq!(envelope.annotations[annotations::SEQUENCE_NUMBER], json!(42));
        assert_eq!(
            envelope.annotation_str(annotations::ENQUEUED_TIME),
            Some("2024-05-01T10:00:00.000Z")
        );
        assert_eq!(envelope.application_properties["temperatureAlert"], "true");
        assert!(!envelope.application_properties.contains_key("iothub-connection-device-id"));
        assert_eq!(envelope.body, Some(EnvelopeBody::Bytes(vec![1, 2])));
    }

    #[test]
    fn test_json_payload_is_structured() {
        let envelope = envelope_from_parts(
            "0",
            br#"{"temperature":21.5}"#,
            Vec::new(),
            delivered_at(0),
        );
        assert_eq!(
            envelope.body,
            Some(EnvelopeBody::Json(json!({"temperature": 21.5})))
        );
    }

    #[test]
    fn test_content_type_overrides_sniffing() {
        let bytes = envelope_from_parts(
            "0",
            br#"{"temperature":21.5}"#,
            vec![header("Content-Type", "application/octet-stream")],
            delivered_at(0),
        );
        assert!(matches!(bytes.body, Some(EnvelopeBody::Bytes(_))));

        let scalar = envelope_from_parts(
            "0",
            b"17",
            vec![header("content-type", "application/json")],
            delivered_at(0),
        );
        assert_eq!(scalar.body, Some(EnvelopeBody::Json(json!(17))));

        // Bare scalars without a declared type stay bytes
        let sniffed = envelope_from_parts("0", b"17", Vec::new(), delivered_at(0));
        assert_eq!(sniffed.body, Some(EnvelopeBody::Bytes(b"17".to_vec())));
    }

    #[test]
    fn test_missing_publish_time_falls_back_to_header() {
        let envelope = envelope_from_parts(
            "0",
            b"",
            vec![header("iothub-enqueuedtime", "2024-05-01T10:00:00Z")],
            DeliveryInfo {
                published: None,
                sequence: None,
            },
        );
        assert_eq!(envelope.body, None);
        assert_eq!(
            envelope.enqueued_time_utc,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert!(!envelope.annotations.contains_key(annotations::SEQUENCE_NUMBER));
    }

    #[test]
    fn test_time_conversions_agree() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let offset = utc_to_offset(now).unwrap();
        assert_eq!(offset_to_utc(offset), Some(now));
    }
}
