use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("message type '{type_name}' not found in schema")]
    SchemaLookup { type_name: String },

    #[error("failed to read schema file {path}: {source}")]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode payload as {type_name}: {reason}")]
    Decode { type_name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DecoderError>;
