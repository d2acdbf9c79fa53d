//! Document Store Driver - the create/read/query boundary the models sit on.
//!
//! A driver speaks raw JSON. It knows nothing about schemas or versions; it
//! only has to report conflicts and missing documents with distinguishable
//! status codes and attach its metadata (`_rid`, `_self`, `_etag`, `_ts`) to
//! every resource it returns.
//!
//! ## Example
//!
//! ```ignore
//! use versioned_store::{DocumentDriver, InMemoryDocumentStore, QuerySpec, QueryOptions};
//!
//! let store = InMemoryDocumentStore::new();
//! let query = QuerySpec::new().filter("fiscalCode", "AAA").order_by_desc("version");
//! let docs = store.query("profiles", &query, QueryOptions::partition("AAA").max_items(1)).await?;
//! ```

#[cfg(feature = "in-memory")]
mod in_memory;
mod query;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryDocumentStore;
pub use query::{OrderBy, QueryOptions, QuerySpec, SqlParameter};

/// Value of a document's partition key. Stores accept strings and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionKeyValue {
    String(String),
    Number(i64),
}

impl PartitionKeyValue {
    pub fn to_value(&self) -> Value {
        match self {
            PartitionKeyValue::String(s) => Value::String(s.clone()),
            PartitionKeyValue::Number(n) => Value::from(*n),
        }
    }

    /// Read a partition key back out of a JSON field.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PartitionKeyValue::String(s.clone())),
            Value::Number(n) => n.as_i64().map(PartitionKeyValue::Number),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKeyValue::String(s) => f.write_str(s),
            PartitionKeyValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for PartitionKeyValue {
    fn from(value: &str) -> Self {
        PartitionKeyValue::String(value.to_string())
    }
}

impl From<String> for PartitionKeyValue {
    fn from(value: String) -> Self {
        PartitionKeyValue::String(value)
    }
}

impl From<&String> for PartitionKeyValue {
    fn from(value: &String) -> Self {
        PartitionKeyValue::String(value.clone())
    }
}

impl From<i64> for PartitionKeyValue {
    fn from(value: i64) -> Self {
        PartitionKeyValue::Number(value)
    }
}

impl From<i32> for PartitionKeyValue {
    fn from(value: i32) -> Self {
        PartitionKeyValue::Number(value.into())
    }
}

impl From<u32> for PartitionKeyValue {
    fn from(value: u32) -> Self {
        PartitionKeyValue::Number(value.into())
    }
}

/// Native failure reported by the store, annotated with its status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status {status}: {message}")]
pub struct StoreError {
    pub status: u16,
    pub sub_status: Option<u32>,
    pub message: String,
}

impl StoreError {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const PRECONDITION_FAILED: u16 = 412;
    pub const TOO_MANY_REQUESTS: u16 = 429;

    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            sub_status: None,
            message: message.into(),
        }
    }

    pub fn with_sub_status(mut self, sub_status: u32) -> Self {
        self.sub_status = Some(sub_status);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Self::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Self::CONFLICT, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(Self::PRECONDITION_FAILED, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Self::CONFLICT
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Self::NOT_FOUND
    }

    pub fn is_precondition_failed(&self) -> bool {
        self.status == Self::PRECONDITION_FAILED
    }

    pub fn is_throttled(&self) -> bool {
        self.status == Self::TOO_MANY_REQUESTS
    }
}

/// Options for the create primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// When set, a document without an `id` is rejected instead of given a
    /// store-generated one. The models always set this.
    pub disable_automatic_id_generation: bool,
}

/// Field-level edit applied by [`DocumentDriver::patch`]. Paths are JSON pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Set { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
    Incr { path: String, value: Value },
}

impl PatchOperation {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        PatchOperation::Set {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        PatchOperation::Replace {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        PatchOperation::Remove { path: path.into() }
    }

    pub fn incr(path: impl Into<String>, value: impl Into<Value>) -> Self {
        PatchOperation::Incr {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Set { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Incr { path, .. } => path,
        }
    }
}

/// Optional guard on a patch: only apply when the stored etag still matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPrecondition {
    pub if_match: Option<String>,
}

impl PatchPrecondition {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
        }
    }
}

/// Raw single-document primitives of a document database.
///
/// Every method is one round trip. Implementations must not retry conflicts
/// and must report "already exists" as 409 and "missing" as 404.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    /// Create a document. `Ok(None)` means the store answered without a body.
    async fn create(
        &self,
        container: &str,
        document: Value,
        partition_key: &PartitionKeyValue,
        options: CreateOptions,
    ) -> Result<Option<Value>, StoreError>;

    /// Point read by id within a partition. `Ok(None)` when absent.
    async fn read(
        &self,
        container: &str,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Value>, StoreError>;

    /// Create or replace a document.
    async fn upsert(
        &self,
        container: &str,
        document: Value,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Value>, StoreError>;

    /// Run a parameterized query template.
    async fn query(
        &self,
        container: &str,
        query: &QuerySpec,
        options: QueryOptions,
    ) -> Result<Vec<Value>, StoreError>;

    /// Apply field-level edits to one document.
    async fn patch(
        &self,
        container: &str,
        id: &str,
        partition_key: &PartitionKeyValue,
        operations: &[PatchOperation],
        precondition: &PatchPrecondition,
    ) -> Result<Option<Value>, StoreError>;
}
