//! Append-only, optimistically-concurrent multi-version records on top of a
//! document database that only offers single-document create/read/query.
//!
//! - [`DocumentModel`] - schema-checked create / find / upsert / patch over one container.
//! - [`SingleKeyVersionedModel`] - every update is a new immutable document `<key>-<version>`.
//! - [`ComposedVersionedModel`] - same, with an external key distinct from the partition key.
//!
//! Every operation returns `Result<_, ModelError>`. A lost optimistic race is
//! an `ErrorResponse` carrying the store's 409; it is never retried here.

mod driver;
mod error;
mod model;
mod schema;
mod versioned;

pub use driver::{
    CreateOptions, DocumentDriver, OrderBy, PartitionKeyValue, PatchOperation,
    PatchPrecondition, QueryOptions, QuerySpec, SqlParameter, StoreError,
};
#[cfg(feature = "in-memory")]
pub use driver::InMemoryDocumentStore;
pub use error::{ConfigError, ModelError};
pub use model::{Document, DocumentModel, ModelConfig, Retrieved, StoreMetadata, RESERVED_FIELDS};
pub use schema::{Validate, ValidationError, ValidationErrors};
pub use versioned::{
    composed_physical_id, physical_id, ComposedKey, ComposedModelId, ComposedVersionedModel,
    KeyScheme, RetrievedVersion, SingleKey, SingleKeyVersionedModel, Version, VersionedDocument,
    VersionedEntity, VersionedModel, VersionOutOfRange, VERSION_DIGITS, VERSION_FIELD,
};

// Re-export the derive macro alongside the trait it implements
pub use versioned_store_macros::VersionedEntity;
