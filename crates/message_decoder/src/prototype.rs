use crate::error::{DecoderError, Result};
use prost_reflect::{DynamicMessage, MessageDescriptor};
use serde_json::Value;

/// A resolved protobuf message type used to decode binary bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderPrototype {
    descriptor: MessageDescriptor,
}

impl DecoderPrototype {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self { descriptor }
    }

    /// Fully-qualified type name without the leading `.`
    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Decode protobuf wire bytes into their JSON mapping
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let message = DynamicMessage::decode(self.descriptor.clone(), bytes).map_err(|e| {
            DecoderError::Decode {
                type_name: self.full_name().to_string(),
                reason: e.to_string(),
            }
        })?;

        serde_json::to_value(&message).map_err(|e| DecoderError::Decode {
            type_name: self.full_name().to_string(),
            reason: e.to_string(),
        })
    }
}
