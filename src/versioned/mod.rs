//! Versioned models - append-only, multi-version records.
//!
//! Every logical update is stored as a new immutable document whose physical
//! id encodes the logical key and a zero-padded version:
//!
//! - single key: `<modelId>-<version:016>`
//! - composed key: `<modelId>-<partitionKey>-<version:016>`
//!
//! The "current" value of an entity is the document with the highest version.
//! Nothing here updates or deletes a stored version. Two writers racing for
//! the same version both try to create the same physical id; the store accepts
//! one and the other gets a 409 back. There is no retry in this layer.
//!
//! ## Example
//!
//! ```ignore
//! use versioned_store::{InMemoryDocumentStore, SingleKeyVersionedModel, Validate, VersionedEntity};
//!
//! #[derive(Serialize, Deserialize, Clone, VersionedEntity)]
//! #[serde(rename_all = "camelCase")]
//! #[versioned(container = "profiles")]
//! struct Profile {
//!     #[versioned(model_id)]
//!     pub fiscal_code: String,
//!     pub status: String,
//! }
//!
//! impl Validate for Profile {}
//!
//! let profiles = SingleKeyVersionedModel::<Profile, _>::with_defaults(InMemoryDocumentStore::new())?;
//! profiles.create(&profile, None).await?;            // AAA-0000000000000000
//! profiles.upsert(&updated, None).await?;            // AAA-0000000000000001
//! let latest = profiles.find_last_version_by_model_id("AAA").await?;
//! ```

mod key;
mod versioned_model;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::driver::PartitionKeyValue;
use crate::model::Document;
use crate::schema::{Validate, ValidationErrors};

pub use key::{ComposedKey, ComposedModelId, KeyScheme, SingleKey};
pub use versioned_model::{
    ComposedVersionedModel, RetrievedVersion, SingleKeyVersionedModel, VersionedModel,
};

/// JSON field holding the version number.
pub const VERSION_FIELD: &str = "version";

/// Digits in the padded version suffix, enough for [`Version::MAX`].
pub const VERSION_DIGITS: usize = 16;

/// Non-negative version number, bounded by the largest integer a JSON
/// number can carry exactly (2^53 - 1). Deserializing a larger number fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u64", into = "u64")]
pub struct Version(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("version {0} exceeds the largest safe integer")]
pub struct VersionOutOfRange(pub u64);

impl Version {
    pub const ZERO: Version = Version(0);
    pub const MAX: Version = Version(9_007_199_254_740_991);

    /// `None` above [`Version::MAX`].
    pub const fn new(value: u64) -> Option<Version> {
        if value <= Self::MAX.0 {
            Some(Version(value))
        } else {
            None
        }
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The following version, or `None` once the safe range is exhausted.
    pub fn next(self) -> Option<Version> {
        self.0.checked_add(1).and_then(Version::new)
    }

    /// Fixed-width form used in physical ids, so string order equals numeric order.
    pub fn padded(self) -> String {
        format!("{:0width$}", self.0, width = VERSION_DIGITS)
    }
}

impl From<u32> for Version {
    fn from(value: u32) -> Self {
        Version(value.into())
    }
}

impl TryFrom<u64> for Version {
    type Error = VersionOutOfRange;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Version::new(value).ok_or(VersionOutOfRange(value))
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical id of one version of a single-key entity.
pub fn physical_id(model_id: &str, version: Version) -> String {
    format!("{}-{}", model_id, version.padded())
}

/// Physical id of one version of a composed-key entity.
pub fn composed_physical_id(
    model_id: &str,
    partition_key: &PartitionKeyValue,
    version: Version,
) -> String {
    format!("{}-{}-{}", model_id, partition_key, version.padded())
}

/// Trait for logical entities stored as a history of versions.
///
/// Usually derived with `#[derive(VersionedEntity)]`. The entity must not
/// serialize fields named `id`, `version` or `_*`; those belong to the stored
/// document. Models check `FIELD_NAMES` at construction and every serialized
/// entity before it is written.
pub trait VersionedEntity: Serialize + DeserializeOwned + Clone + Send + Sync + Validate {
    /// Default container name for this entity type.
    const CONTAINER: &'static str;

    /// Serialized names of the entity's own fields.
    const FIELD_NAMES: &'static [&'static str] = &[];

    /// JSON field carrying the logical (external reference) key.
    const MODEL_ID_FIELD: &'static str;

    /// JSON field the store partitions on. Equal to `MODEL_ID_FIELD` for
    /// single-key entities, distinct for composed-key entities.
    const PARTITION_KEY_FIELD: &'static str = Self::MODEL_ID_FIELD;

    fn model_id(&self) -> &str;

    fn partition_key(&self) -> PartitionKeyValue {
        PartitionKeyValue::from(self.model_id())
    }
}

/// Stored shape of one entity version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument<E> {
    pub id: String,
    pub version: Version,
    #[serde(flatten)]
    pub entity: E,
}

impl<E: Validate> Validate for VersionedDocument<E> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.entity.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if self.id.is_empty() {
            errors.push("/id", "must not be empty");
        }
        errors.into_result()
    }
}

impl<E: VersionedEntity> Document for VersionedDocument<E> {
    const CONTAINER: &'static str = E::CONTAINER;
    const PARTITION_KEY_FIELD: &'static str = E::PARTITION_KEY_FIELD;
    const APPEND_ONLY: bool = true;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> PartitionKeyValue {
        self.entity.partition_key()
    }

    fn immutable_fields() -> Vec<&'static str> {
        vec![VERSION_FIELD, E::MODEL_ID_FIELD]
    }
}
