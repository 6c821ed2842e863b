use message_decoder::{DecodeType, DecoderPrototype, SchemaSource};

/// How incoming message bodies are decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderConfig {
    pub decode_type: DecodeType,
    /// Schema text the prototype was resolved from
    pub decoder_proto_file: Option<String>,
    pub decoder_prototype: Option<DecoderPrototype>,
}

impl DecoderConfig {
    /// The prototype to decode with. Only a protobuf config has one.
    pub fn active_prototype(&self) -> Option<&DecoderPrototype> {
        match self.decode_type {
            DecodeType::Protobuf => self.decoder_prototype.as_ref(),
            DecodeType::Json => None,
        }
    }
}

/// Request to change the decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderInfoParams {
    pub decode_type: DecodeType,
    pub schema: Option<SchemaSource>,
    pub type_name: Option<String>,
}

impl DecoderInfoParams {
    pub fn json() -> Self {
        Self {
            decode_type: DecodeType::Json,
            schema: None,
            type_name: None,
        }
    }

    pub fn protobuf(schema: SchemaSource, type_name: impl Into<String>) -> Self {
        Self {
            decode_type: DecodeType::Protobuf,
            schema: Some(schema),
            type_name: Some(type_name.into()),
        }
    }
}
