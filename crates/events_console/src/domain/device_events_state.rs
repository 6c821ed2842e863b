use common::domain::Message;

use super::{DecoderConfig, FormMode};

/// Everything the events view renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceEventsState {
    /// Newest first
    pub message: Vec<Message>,
    pub content_type: DecoderConfig,
    pub form_mode: FormMode,
    /// Marker of the start call whose result will be applied
    pub in_flight: Option<u64>,
}

/// Fold a batch (oldest first) into newest-first history.
///
/// Only messages strictly newer than the current head survive, so a
/// re-poll that overlaps the previous window adds nothing twice.
pub fn merge_messages(history: Vec<Message>, batch: Vec<Message>) -> Vec<Message> {
    let mut incoming: Vec<Message> = batch.into_iter().rev().collect();
    if let Some(head) = history.first() {
        incoming.retain(|message| message.is_newer_than(head));
    }
    incoming.extend(history);
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn at(enqueued_time: &str) -> Message {
        Message {
            body: None,
            enqueued_time: enqueued_time.to_string(),
            properties: Map::new(),
            system_properties: None,
        }
    }

    fn times(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.enqueued_time.as_str()).collect()
    }

    const T1: &str = "2024-05-01T10:00:01.000Z";
    const T2: &str = "2024-05-01T10:00:02.000Z";
    const T3: &str = "2024-05-01T10:00:03.000Z";

    #[test]
    fn test_merge_drops_overlapping_tail() {
        let merged = merge_messages(vec![at(T2), at(T1)], vec![at(T1), at(T3)]);
        assert_eq!(times(&merged), vec![T3, T2, T1]);
    }

    #[test]
    fn test_merge_into_empty_history_reverses_batch() {
        let merged = merge_messages(Vec::new(), vec![at(T1), at(T2), at(T3)]);
        assert_eq!(times(&merged), vec![T3, T2, T1]);
    }

    #[test]
    fn test_merge_drops_equal_timestamps() {
        let merged = merge_messages(vec![at(T2)], vec![at(T2)]);
        assert_eq!(times(&merged), vec![T2]);
    }

    #[test]
    fn test_empty_batch_keeps_history() {
        let merged = merge_messages(vec![at(T2), at(T1)], Vec::new());
        assert_eq!(times(&merged), vec![T2, T1]);
    }
}
