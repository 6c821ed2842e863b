use common::domain::{annotations, format_enqueued_time, EventEnvelope, Message, MonitorParams};
use serde_json::Value;

/// Accumulates the envelopes of one monitor window that belong to the
/// requested device.
#[derive(Debug)]
pub struct EnvelopeCollector {
    device_id: String,
    module_id: Option<String>,
    fetch_system_properties: bool,
    messages: Vec<Message>,
    skipped: usize,
}

impl EnvelopeCollector {
    pub fn new(params: &MonitorParams) -> Self {
        Self {
            device_id: params.device_id.clone(),
            module_id: params.module_id.clone().filter(|m| !m.is_empty()),
            fetch_system_properties: params.fetch_system_properties,
            messages: Vec::new(),
            skipped: 0,
        }
    }

    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if envelope.annotation_str(annotations::DEVICE_ID) != Some(self.device_id.as_str()) {
            return false;
        }
        match &self.module_id {
            Some(module_id) => {
                envelope.annotation_str(annotations::MODULE_ID) == Some(module_id.as_str())
            }
            None => true,
        }
    }

    /// Returns whether the envelope was kept.
    pub fn accept(&mut self, envelope: EventEnvelope) -> bool {
        if !self.matches(&envelope) {
            self.skipped += 1;
            return false;
        }
        self.messages
            .push(envelope_to_message(envelope, self.fetch_system_properties));
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Messages oldest first. Partitions are read concurrently, so arrival
    /// order only holds per partition; ties keep arrival order.
    pub fn into_messages(mut self) -> Vec<Message> {
        self.messages.sort_by(|a, b| a.cmp_enqueued(b));
        self.messages
    }
}

pub fn envelope_to_message(envelope: EventEnvelope, fetch_system_properties: bool) -> Message {
    let enqueued_time = format_enqueued_time(envelope.enqueued_time_utc);
    let system_properties = if fetch_system_properties {
        let mut system = envelope.annotations;
        system
            .entry(annotations::ENQUEUED_TIME)
            .or_insert_with(|| Value::String(enqueued_time.clone()));
        Some(system)
    } else {
        None
    };

    Message {
        body: envelope.body.map(Into::into),
        enqueued_time,
        properties: envelope.application_properties,
        system_properties,
    }
}
