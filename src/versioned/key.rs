//! Key schemes: how a logical key maps to physical ids, partitions and queries.

use std::fmt;

use super::{composed_physical_id, physical_id, Version, VersionedEntity};
use crate::driver::{PartitionKeyValue, QuerySpec};
use crate::error::ConfigError;
use crate::model::check_field_name;

/// Maps an entity's logical key onto the store.
pub trait KeyScheme<E: VersionedEntity>: Send + Sync + 'static {
    /// Everything needed to address one logical entity.
    type Key: Clone + fmt::Debug + Send + Sync;

    /// Reject entity shapes this scheme cannot serve.
    fn check_config() -> Result<(), ConfigError>;

    fn key_of(entity: &E) -> Self::Key;

    fn partition_key(key: &Self::Key) -> PartitionKeyValue;

    fn physical_id(key: &Self::Key, version: Version) -> String;

    /// Equality filters selecting every version of the logical entity.
    fn key_query(key: &Self::Key) -> QuerySpec;
}

/// One field is both the logical key and the partition key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleKey;

impl<E: VersionedEntity> KeyScheme<E> for SingleKey {
    type Key = String;

    fn check_config() -> Result<(), ConfigError> {
        check_field_name(E::MODEL_ID_FIELD)?;
        if E::PARTITION_KEY_FIELD != E::MODEL_ID_FIELD {
            return Err(ConfigError::SplitKey {
                model_id_field: E::MODEL_ID_FIELD,
                partition_key_field: E::PARTITION_KEY_FIELD,
            });
        }
        Ok(())
    }

    fn key_of(entity: &E) -> String {
        entity.model_id().to_string()
    }

    fn partition_key(key: &String) -> PartitionKeyValue {
        PartitionKeyValue::from(key)
    }

    fn physical_id(key: &String, version: Version) -> String {
        physical_id(key, version)
    }

    fn key_query(key: &String) -> QuerySpec {
        QuerySpec::new().filter(E::MODEL_ID_FIELD, key.as_str())
    }
}

/// External reference key of a composed-key entity, together with the
/// partition it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComposedModelId {
    pub model_id: String,
    pub partition_key: PartitionKeyValue,
}

impl ComposedModelId {
    pub fn new(model_id: impl Into<String>, partition_key: impl Into<PartitionKeyValue>) -> Self {
        Self {
            model_id: model_id.into(),
            partition_key: partition_key.into(),
        }
    }
}

/// The logical key and the partition key are two distinct fields. Many
/// independently versioned entities may share one partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposedKey;

impl<E: VersionedEntity> KeyScheme<E> for ComposedKey {
    type Key = ComposedModelId;

    fn check_config() -> Result<(), ConfigError> {
        check_field_name(E::MODEL_ID_FIELD)?;
        check_field_name(E::PARTITION_KEY_FIELD)?;
        if E::PARTITION_KEY_FIELD == E::MODEL_ID_FIELD {
            return Err(ConfigError::KeyCollapse(E::MODEL_ID_FIELD));
        }
        Ok(())
    }

    fn key_of(entity: &E) -> ComposedModelId {
        ComposedModelId {
            model_id: entity.model_id().to_string(),
            partition_key: entity.partition_key(),
        }
    }

    fn partition_key(key: &ComposedModelId) -> PartitionKeyValue {
        key.partition_key.clone()
    }

    fn physical_id(key: &ComposedModelId, version: Version) -> String {
        composed_physical_id(&key.model_id, &key.partition_key, version)
    }

    fn key_query(key: &ComposedModelId) -> QuerySpec {
        QuerySpec::new()
            .filter(E::MODEL_ID_FIELD, key.model_id.as_str())
            .filter(E::PARTITION_KEY_FIELD, key.partition_key.to_value())
    }
}
