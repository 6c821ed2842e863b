use common::domain::{annotations, Message};

const TELEMETRY_SOURCE: &str = "telemetry";

/// Decides whether a message belongs to some view of the stream
pub trait MessagePredicate {
    fn matches(&self, message: &Message) -> bool;
}

impl<F> MessagePredicate for F
where
    F: Fn(&Message) -> bool,
{
    fn matches(&self, message: &Message) -> bool {
        self(message)
    }
}

pub fn filter<P: MessagePredicate + ?Sized>(message: &Message, predicate: &P) -> bool {
    predicate.matches(message)
}

/// Scopes telemetry to one component of a device.
///
/// A message matches when its component-name or interface-id annotation
/// equals the configured value and its message source, if stamped, is
/// telemetry. With neither value configured the filter selects the
/// device's default component, i.e. messages without a component name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentFilter {
    pub component_name: Option<String>,
    pub interface_id: Option<String>,
}

impl ComponentFilter {
    pub fn for_component(component_name: impl Into<String>) -> Self {
        Self {
            component_name: Some(component_name.into()),
            interface_id: None,
        }
    }

    pub fn for_interface(interface_id: impl Into<String>) -> Self {
        Self {
            component_name: None,
            interface_id: Some(interface_id.into()),
        }
    }

    fn matches_component(&self, message: &Message) -> bool {
        if self.component_name.is_none() && self.interface_id.is_none() {
            return message.system_property(annotations::COMPONENT_NAME).is_none();
        }

        let by_name = self.component_name.as_deref().is_some_and(|name| {
            message.system_property(annotations::COMPONENT_NAME) == Some(name)
        });
        let by_interface = self.interface_id.as_deref().is_some_and(|id| {
            message.system_property(annotations::INTERFACE_ID) == Some(id)
        });
        by_name || by_interface
    }
}

impl MessagePredicate for ComponentFilter {
    fn matches(&self, message: &Message) -> bool {
        let from_telemetry = message
            .system_property(annotations::MESSAGE_SOURCE)
            .map_or(true, |source| source.eq_ignore_ascii_case(TELEMETRY_SOURCE));

        from_telemetry && self.matches_component(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn message_with(system_properties: Value) -> Message {
        Message {
            body: None,
            enqueued_time: "2024-05-01T10:00:00.000Z".to_string(),
            properties: Map::new(),
            system_properties: system_properties.as_object().cloned(),
        }
    }

    #[test]
    fn test_component_match_without_source() {
        let message = message_with(json!({"iothub-component-name": "X"}));
        assert!(filter(&message, &ComponentFilter::for_component("X")));
        assert!(!filter(&message, &ComponentFilter::for_component("Y")));
    }

    #[test]
    fn test_non_telemetry_source_is_excluded() {
        let message = message_with(json!({
            "iothub-component-name": "X",
            "iothub-message-source": "twinChangeEvents",
        }));
        assert!(!filter(&message, &ComponentFilter::for_component("X")));
    }

    #[test]
    fn test_telemetry_source_is_case_insensitive() {
        let message = message_with(json!({
            "iothub-component-name": "X",
            "iothub-message-source": "Telemetry",
        }));
        assert!(filter(&message, &ComponentFilter::for_component("X")));
    }

    #[test]
    fn test_interface_id_match() {
        let message = message_with(json!({
            "iothub-interface-id": "dtmi:com:example:Thermostat;1",
        }));
        assert!(filter(
            &message,
            &ComponentFilter::for_interface("dtmi:com:example:Thermostat;1")
        ));
        assert!(!filter(&message, &ComponentFilter::for_component("X")));
    }

    #[test]
    fn test_default_component_selects_unscoped_messages() {
        let scoped = message_with(json!({"iothub-component-name": "X"}));
        let unscoped = message_with(json!({"iothub-connection-device-id": "dev-1"}));
        let default = ComponentFilter::default();
        assert!(!filter(&scoped, &default));
        assert!(filter(&unscoped, &default));
    }

    #[test]
    fn test_message_without_system_properties() {
        let message = Message {
            body: None,
            enqueued_time: "t".to_string(),
            properties: Map::new(),
            system_properties: None,
        };
        assert!(!filter(&message, &ComponentFilter::for_component("X")));
        assert!(filter(&message, &|m: &Message| m.enqueued_time == "t"));
    }
}
