//! Models - typed, schema-checked CRUD over one document container.
//!
//! A model isolates callers from raw driver calls: every outbound document is
//! validated against its write shape, every resource coming back is decoded
//! against its read shape ([`Retrieved<T>`]), and every failure is reported
//! through [`ModelError`](crate::ModelError).
//!
//! ## Example
//!
//! ```ignore
//! use versioned_store::{Document, DocumentModel, InMemoryDocumentStore, ModelConfig};
//!
//! #[derive(Serialize, Deserialize, Clone)]
//! struct Setting {
//!     pub id: String,
//!     pub enabled: bool,
//! }
//!
//! impl Validate for Setting {}
//!
//! impl Document for Setting {
//!     const CONTAINER: &'static str = "settings";
//!     const PARTITION_KEY_FIELD: &'static str = "id";
//!     fn id(&self) -> &str { &self.id }
//!     fn partition_key(&self) -> PartitionKeyValue { self.id.as_str().into() }
//! }
//!
//! let model = DocumentModel::<Setting, _>::with_defaults(InMemoryDocumentStore::new())?;
//! let stored = model.upsert(&setting).await?;
//! let loaded = model.find("flag-1", &"flag-1".into()).await?;
//! ```

mod document_model;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::driver::PartitionKeyValue;
use crate::error::ConfigError;
use crate::schema::{ValidationErrors, Validate};

pub use document_model::DocumentModel;

/// Field names owned by the store or by the versioning layer. Entity key
/// fields may not use them.
pub const RESERVED_FIELDS: [&str; 6] = ["id", "version", "_rid", "_self", "_etag", "_ts"];

/// Trait for types persisted as whole documents in a container.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Validate {
    /// Default container name for this document type.
    const CONTAINER: &'static str;

    /// JSON field the store partitions on.
    const PARTITION_KEY_FIELD: &'static str;

    /// Physical identifier, unique within the partition.
    fn id(&self) -> &str;

    fn partition_key(&self) -> PartitionKeyValue;

    /// Stored documents of this type are never replaced or patched, only
    /// created.
    const APPEND_ONLY: bool = false;

    /// Top-level fields a patch may never touch, besides `id`, the partition
    /// key and store metadata.
    fn immutable_fields() -> Vec<&'static str> {
        Vec::new()
    }
}

/// Store-assigned metadata attached to every retrieved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(rename = "_rid")]
    pub rid: String,
    #[serde(rename = "_self")]
    pub self_link: String,
    #[serde(rename = "_etag")]
    pub etag: String,
    #[serde(rename = "_ts")]
    pub ts: u64,
}

/// Read shape of a document: the data plus the store's metadata.
///
/// Flattened on the wire. Document types must not use
/// `#[serde(deny_unknown_fields)]`, since the metadata fields share the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieved<T> {
    #[serde(flatten)]
    pub data: T,
    #[serde(flatten)]
    pub metadata: StoreMetadata,
}

impl<T> Retrieved<T> {
    pub fn into_data(self) -> T {
        self.data
    }

    pub fn etag(&self) -> &str {
        &self.metadata.etag
    }
}

impl<T: Validate> Validate for Retrieved<T> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.data.validate()
    }
}

/// Per-model configuration, passed to every model constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Container (collection) the model reads and writes.
    pub container: String,
}

impl ModelConfig {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }

    /// Configuration using the document type's default container.
    pub fn for_entity<T: Document>() -> Self {
        Self::new(T::CONTAINER)
    }

    /// Prefix the container name, e.g. for per-environment containers.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.container = format!("{}{}", prefix, self.container);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.container.trim().is_empty() {
            return Err(ConfigError::EmptyContainer);
        }
        Ok(())
    }
}

/// Reject entity field names that collide with store or version bookkeeping.
pub(crate) fn check_field_name(field: &'static str) -> Result<(), ConfigError> {
    if RESERVED_FIELDS.contains(&field) || field.starts_with('_') {
        return Err(ConfigError::ReservedField(field));
    }
    Ok(())
}
