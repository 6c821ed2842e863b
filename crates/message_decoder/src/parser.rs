use crate::prototype::DecoderPrototype;
use common::domain::{Message, MessageBody};
use serde_json::Value;
use tracing::warn;

/// Decode a message's raw buffer body.
///
/// `None` is returned as given so callers may parse speculatively. Messages
/// without a body, or whose body is already structured, come back unchanged.
/// A raw buffer is decoded through `prototype` when one is supplied and
/// otherwise rendered as text, one character per byte. If the prototype
/// rejects the bytes the message is returned unchanged.
pub fn parse(message: Option<Message>, prototype: Option<&DecoderPrototype>) -> Option<Message> {
    let mut message = message?;

    let Some(bytes) = message.body.as_ref().and_then(MessageBody::as_raw_buffer) else {
        return Some(message);
    };

    let decoded = match prototype {
        Some(prototype) => match prototype.decode(bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    error = %e,
                    enqueued_time = %message.enqueued_time,
                    "failed to decode message body, leaving it raw"
                );
                return Some(message);
            }
        },
        None => Value::String(bytes_as_text(bytes)),
    };

    message.body = Some(MessageBody::Decoded(decoded));
    Some(message)
}

/// Parse every message of a batch, keeping order
pub fn parse_all(messages: Vec<Message>, prototype: Option<&DecoderPrototype>) -> Vec<Message> {
    messages
        .into_iter()
        .filter_map(|message| parse(Some(message), prototype))
        .collect()
}

fn bytes_as_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
