//! DocumentModel - typed CRUD over a single container.

use std::marker::PhantomData;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Document, ModelConfig, Retrieved};
use crate::driver::{
    CreateOptions, DocumentDriver, PartitionKeyValue, PatchOperation, PatchPrecondition,
    QueryOptions, QuerySpec,
};
use crate::error::{ConfigError, ModelError};
use crate::schema::{self, ValidationErrors};

/// Typed model over one container of `T` documents.
///
/// Writes are validated before they reach the driver; every resource the
/// driver returns is decoded as [`Retrieved<T>`] and validated again.
pub struct DocumentModel<T, D> {
    driver: D,
    config: ModelConfig,
    _marker: PhantomData<T>,
}

impl<T: Document, D: DocumentDriver> DocumentModel<T, D> {
    pub fn new(driver: D, config: ModelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            driver,
            config,
            _marker: PhantomData,
        })
    }

    /// Model over `T::CONTAINER`.
    pub fn with_defaults(driver: D) -> Result<Self, ConfigError> {
        Self::new(driver, ModelConfig::for_entity::<T>())
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Create a new document. The store never generates ids for models; a
    /// document whose id already exists fails with the store's conflict status.
    pub async fn create(&self, document: &T) -> Result<Retrieved<T>, ModelError> {
        let body = self.encode(document)?;
        let partition_key = document.partition_key();
        debug!(
            container = %self.config.container,
            id = document.id(),
            partition_key = %partition_key,
            "creating document"
        );

        let options = CreateOptions {
            disable_automatic_id_generation: true,
        };
        let resource = self
            .driver
            .create(&self.config.container, body, &partition_key, options)
            .await
            .map_err(|err| {
                if err.is_conflict() {
                    warn!(
                        container = %self.config.container,
                        id = document.id(),
                        "create conflict: document already exists"
                    );
                }
                ModelError::from(err)
            })?;

        self.decode(resource)
    }

    /// Create or replace a document. Refused for append-only types.
    pub async fn upsert(&self, document: &T) -> Result<Retrieved<T>, ModelError> {
        self.check_rewritable(document.id(), "upsert")?;
        let body = self.encode(document)?;
        let partition_key = document.partition_key();
        debug!(
            container = %self.config.container,
            id = document.id(),
            partition_key = %partition_key,
            "upserting document"
        );

        let resource = self
            .driver
            .upsert(&self.config.container, body, &partition_key)
            .await?;

        self.decode(resource)
    }

    /// Point read. Absence is `Ok(None)`, not an error.
    pub async fn find(
        &self,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Retrieved<T>>, ModelError> {
        debug!(
            container = %self.config.container,
            id,
            partition_key = %partition_key,
            "reading document"
        );

        match self
            .driver
            .read(&self.config.container, id, partition_key)
            .await
        {
            Ok(Some(resource)) => self.decode(Some(resource)).map(Some),
            Ok(None) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Run a query template and decode every result. One undecodable result
    /// fails the whole call.
    pub async fn find_by_query(
        &self,
        query: &QuerySpec,
        options: QueryOptions,
    ) -> Result<Vec<Retrieved<T>>, ModelError> {
        debug!(
            container = %self.config.container,
            sql = %query.sql(),
            partition_key = ?options.partition_key,
            max_item_count = ?options.max_item_count,
            "querying documents"
        );

        let resources = self
            .driver
            .query(&self.config.container, query, options)
            .await?;

        resources
            .into_iter()
            .map(|resource| self.decode(Some(resource)))
            .collect()
    }

    /// Apply field-level edits. Key fields, store metadata and the type's
    /// immutable fields cannot be patched.
    pub async fn patch(
        &self,
        id: &str,
        partition_key: &PartitionKeyValue,
        operations: &[PatchOperation],
        precondition: Option<PatchPrecondition>,
    ) -> Result<Retrieved<T>, ModelError> {
        self.check_rewritable(id, "patch")?;
        check_patch_paths::<T>(operations)?;
        debug!(
            container = %self.config.container,
            id,
            partition_key = %partition_key,
            operations = operations.len(),
            "patching document"
        );

        let precondition = precondition.unwrap_or_default();
        let resource = self
            .driver
            .patch(
                &self.config.container,
                id,
                partition_key,
                operations,
                &precondition,
            )
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ModelError::NotFound {
                        container: self.config.container.clone(),
                        id: id.to_string(),
                    }
                } else {
                    ModelError::from(err)
                }
            })?;

        self.decode(resource)
    }

    fn check_rewritable(&self, id: &str, operation: &str) -> Result<(), ModelError> {
        if !T::APPEND_ONLY {
            return Ok(());
        }
        warn!(
            container = %self.config.container,
            id,
            operation,
            "refusing to rewrite an append-only document"
        );
        Err(ModelError::Decoding(ValidationErrors::single(
            "/id",
            format!(
                "documents in `{}` are append-only; {} is not allowed",
                self.config.container, operation
            ),
        )))
    }

    fn encode(&self, document: &T) -> Result<Value, ModelError> {
        schema::encode(document).map_err(|errors| {
            warn!(
                container = %self.config.container,
                id = document.id(),
                %errors,
                "document failed write validation"
            );
            ModelError::Decoding(errors)
        })
    }

    fn decode(&self, resource: Option<Value>) -> Result<Retrieved<T>, ModelError> {
        let resource = resource.ok_or_else(|| {
            warn!(container = %self.config.container, "store returned an empty response");
            ModelError::EmptyResponse
        })?;

        schema::decode::<Retrieved<T>>(resource).map_err(|errors| {
            warn!(
                container = %self.config.container,
                %errors,
                "stored document failed read validation"
            );
            ModelError::Decoding(errors)
        })
    }
}

fn check_patch_paths<T: Document>(operations: &[PatchOperation]) -> Result<(), ModelError> {
    let immutable = T::immutable_fields();
    let mut errors = ValidationErrors::new();

    for operation in operations {
        let path = operation.path();
        let field = path.trim_start_matches('/').split('/').next().unwrap_or("");
        if field == "id"
            || field == T::PARTITION_KEY_FIELD
            || field.starts_with('_')
            || immutable.contains(&field)
        {
            errors.push(path, "field cannot be patched");
        }
    }

    errors.into_result().map_err(ModelError::Decoding)
}
