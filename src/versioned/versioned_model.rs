//! VersionedModel - append-only writes and latest-version reads.

use std::marker::PhantomData;

use tracing::debug;

use super::key::{ComposedKey, ComposedModelId, KeyScheme, SingleKey};
use super::{Version, VersionedDocument, VersionedEntity, VERSION_FIELD};
use crate::driver::{DocumentDriver, PartitionKeyValue, QueryOptions};
use crate::error::{ConfigError, ModelError};
use crate::model::{check_field_name, DocumentModel, ModelConfig, Retrieved, RESERVED_FIELDS};
use crate::schema::ValidationErrors;

/// A stored entity version, as returned by every versioned operation.
pub type RetrievedVersion<E> = Retrieved<VersionedDocument<E>>;

/// Versioned model keyed by one field that is also the partition key.
pub type SingleKeyVersionedModel<E, D> = VersionedModel<E, D, SingleKey>;

/// Versioned model keyed by an external reference field plus a distinct
/// partition key field.
pub type ComposedVersionedModel<E, D> = VersionedModel<E, D, ComposedKey>;

/// Append-only multi-version model over a [`DocumentModel`].
///
/// `upsert` without an explicit version is two round trips (query the
/// latest, then create the next). Under contention the create can fail with a
/// 409 conflict; retrying with a freshly queried version is up to the caller.
pub struct VersionedModel<E, D, K = SingleKey> {
    model: DocumentModel<VersionedDocument<E>, D>,
    _scheme: PhantomData<K>,
}

impl<E, D, K> VersionedModel<E, D, K>
where
    E: VersionedEntity,
    D: DocumentDriver,
    K: KeyScheme<E>,
{
    /// Fails if the entity's key fields do not fit the key scheme, or if it
    /// declares a field reserved for the stored document.
    pub fn new(driver: D, config: ModelConfig) -> Result<Self, ConfigError> {
        for &field in E::FIELD_NAMES {
            check_field_name(field)?;
        }
        K::check_config()?;
        Ok(Self {
            model: DocumentModel::new(driver, config)?,
            _scheme: PhantomData,
        })
    }

    /// Model over `E::CONTAINER`.
    pub fn with_defaults(driver: D) -> Result<Self, ConfigError> {
        Self::new(driver, ModelConfig::for_entity::<VersionedDocument<E>>())
    }

    /// The underlying generic model, for point reads and queries. Stored
    /// versions are append-only, so its `upsert` and `patch` are refused.
    pub fn document_model(&self) -> &DocumentModel<VersionedDocument<E>, D> {
        &self.model
    }

    /// Create the entity at `version`, or at version 0 when none is given.
    pub async fn create(
        &self,
        entity: &E,
        version: Option<Version>,
    ) -> Result<RetrievedVersion<E>, ModelError> {
        self.create_new_version(entity, version.unwrap_or(Version::ZERO))
            .await
    }

    /// Write exactly `version`, with no lookup. If that version is already
    /// recorded the store's conflict comes back as `ErrorResponse`.
    pub async fn create_new_version(
        &self,
        entity: &E,
        version: Version,
    ) -> Result<RetrievedVersion<E>, ModelError> {
        check_entity_fields(entity)?;
        self.write_version(entity, version).await
    }

    async fn write_version(
        &self,
        entity: &E,
        version: Version,
    ) -> Result<RetrievedVersion<E>, ModelError> {
        let key = K::key_of(entity);
        let document = VersionedDocument {
            id: K::physical_id(&key, version),
            version,
            entity: entity.clone(),
        };
        debug!(
            container = self.model.container(),
            id = %document.id,
            %version,
            "creating entity version"
        );
        self.model.create(&document).await
    }

    /// Append the next version.
    ///
    /// With `version` given, writes `version + 1` without reading. Otherwise
    /// reads the latest stored version and writes the one after it, or 0 for
    /// a new entity.
    pub async fn upsert(
        &self,
        entity: &E,
        version: Option<Version>,
    ) -> Result<RetrievedVersion<E>, ModelError> {
        check_entity_fields(entity)?;
        let next = match version {
            Some(current) => current.next(),
            None => {
                let key = K::key_of(entity);
                match self.find_last_version(&key).await? {
                    Some(latest) => latest.data.version.next(),
                    None => Some(Version::ZERO),
                }
            }
        }
        .ok_or_else(|| {
            ModelError::Decoding(ValidationErrors::single(
                "/version",
                "no version left below the largest safe integer",
            ))
        })?;

        self.write_version(entity, next).await
    }

    /// The highest stored version of one entity, read from its partition only.
    pub async fn find_last_version(
        &self,
        key: &K::Key,
    ) -> Result<Option<RetrievedVersion<E>>, ModelError> {
        let query = K::key_query(key).order_by_desc(VERSION_FIELD);
        let options = QueryOptions::partition(K::partition_key(key)).max_items(1);
        let latest = self.model.find_by_query(&query, options).await?;
        Ok(latest.into_iter().next())
    }

    /// Point read of one specific version.
    pub async fn find_version(
        &self,
        key: &K::Key,
        version: Version,
    ) -> Result<Option<RetrievedVersion<E>>, ModelError> {
        self.model
            .find(&K::physical_id(key, version), &K::partition_key(key))
            .await
    }

    /// Every stored version of one entity, oldest first.
    pub async fn find_all_versions(
        &self,
        key: &K::Key,
    ) -> Result<Vec<RetrievedVersion<E>>, ModelError> {
        let query = K::key_query(key).order_by_asc(VERSION_FIELD);
        let options = QueryOptions::partition(K::partition_key(key));
        self.model.find_by_query(&query, options).await
    }
}

impl<E, D> VersionedModel<E, D, SingleKey>
where
    E: VersionedEntity,
    D: DocumentDriver,
{
    pub async fn find_last_version_by_model_id(
        &self,
        model_id: &str,
    ) -> Result<Option<RetrievedVersion<E>>, ModelError> {
        self.find_last_version(&model_id.to_string()).await
    }
}

impl<E, D> VersionedModel<E, D, ComposedKey>
where
    E: VersionedEntity,
    D: DocumentDriver,
{
    /// Latest version for an external key, scoped to one partition.
    pub async fn find_last_version_by_model_id(
        &self,
        model_id: &str,
        partition_key: PartitionKeyValue,
    ) -> Result<Option<RetrievedVersion<E>>, ModelError> {
        self.find_last_version(&ComposedModelId {
            model_id: model_id.to_string(),
            partition_key,
        })
        .await
    }
}

/// An entity field named like a stored-document field would overwrite it
/// when the entity is flattened into the document.
fn check_entity_fields<E: VersionedEntity>(entity: &E) -> Result<(), ModelError> {
    let value = serde_json::to_value(entity).map_err(ValidationErrors::from)?;
    let mut errors = ValidationErrors::new();
    if let Some(fields) = value.as_object() {
        for field in fields.keys() {
            if RESERVED_FIELDS.contains(&field.as_str()) || field.starts_with('_') {
                errors.push(
                    format!("/{}", field),
                    "reserved for store or version bookkeeping",
                );
            }
        }
    }
    errors.into_result().map_err(ModelError::Decoding)
}
