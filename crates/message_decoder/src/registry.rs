use crate::error::{DecoderError, Result};
use crate::prototype::DecoderPrototype;
use async_trait::async_trait;
use prost_reflect::DescriptorPool;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Name the in-memory schema is registered under
const SCHEMA_FILE_NAME: &str = "decoder.proto";

/// Where a schema definition comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Text(String),
    File(PathBuf),
}

impl SchemaSource {
    async fn read(&self) -> Result<String> {
        match self {
            SchemaSource::Text(text) => Ok(text.clone()),
            SchemaSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| DecoderError::SchemaFile {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

/// A schema that compiled and contained the requested type
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    /// Schema text as read, kept so the console can show it again
    pub source_text: String,
    pub prototype: DecoderPrototype,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn resolve(&self, source: &SchemaSource, type_name: &str) -> Result<ResolvedSchema>;
}

/// Compiles `.proto` sources and resolves message types from them.
///
/// Schemas are expected to be self-contained: imports are not followed.
#[derive(Debug, Default, Clone)]
pub struct DecoderRegistry;

impl DecoderRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Compile schema text into a descriptor pool
    pub fn compile(&self, source: &str) -> Result<DescriptorPool> {
        let file = protox_parse::parse(SCHEMA_FILE_NAME, source)
            .map_err(|e| DecoderError::SchemaParse(e.to_string()))?;

        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(file)
            .map_err(|e| DecoderError::SchemaParse(e.to_string()))?;
        Ok(pool)
    }

    /// Find a message type by fully-qualified name, falling back to a
    /// unique match on the simple name.
    pub fn lookup(&self, pool: &DescriptorPool, type_name: &str) -> Result<DecoderPrototype> {
        let name = type_name.trim().trim_start_matches('.');
        let not_found = || DecoderError::SchemaLookup {
            type_name: type_name.to_string(),
        };

        if name.is_empty() {
            return Err(not_found());
        }

        if let Some(descriptor) = pool.get_message_by_name(name) {
            return Ok(DecoderPrototype::new(descriptor));
        }

        let mut candidates = pool.all_messages().filter(|m| m.name() == name);
        match (candidates.next(), candidates.next()) {
            (Some(descriptor), None) => Ok(DecoderPrototype::new(descriptor)),
            _ => Err(not_found()),
        }
    }
}

#[async_trait]
impl SchemaResolver for DecoderRegistry {
    #[instrument(skip(self, source), fields(type_name = %type_name))]
    async fn resolve(&self, source: &SchemaSource, type_name: &str) -> Result<ResolvedSchema> {
        let source_text = source.read().await?;
        let pool = self.compile(&source_text)?;
        let prototype = self.lookup(&pool, type_name)?;

        debug!(resolved = %prototype.full_name(), "resolved decoder prototype");
        Ok(ResolvedSchema {
            source_text,
            prototype,
        })
    }
}
