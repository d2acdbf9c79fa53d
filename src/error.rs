//! Outcome taxonomy shared by every model operation.
//!
//! Operations never panic on store or schema problems. They return
//! `Result<_, ModelError>`, and "no document" is reported as `Ok(None)`,
//! which callers must keep distinct from every error kind below.

use thiserror::Error;

use crate::driver::StoreError;
use crate::schema::ValidationErrors;

/// Closed set of failure kinds returned by the document and versioned models.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A document failed schema validation, outbound (write shape) or
    /// inbound (read shape).
    #[error("decoding error: {0}")]
    Decoding(ValidationErrors),

    /// The store call succeeded but returned no resource body.
    #[error("empty response from document store")]
    EmptyResponse,

    /// The store call failed. Carries the store's native status code.
    #[error("document store error: {0}")]
    ErrorResponse(StoreError),

    /// The targeted document does not exist (patch only; reads report absence as `None`).
    #[error("document not found: {container}/{id}")]
    NotFound { container: String, id: String },
}

impl ModelError {
    /// The underlying store status code, when the failure came from the store.
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::ErrorResponse(err) => Some(err.status),
            ModelError::NotFound { .. } => Some(StoreError::NOT_FOUND),
            _ => None,
        }
    }

    /// True when a create lost the optimistic race: the physical id already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ModelError::ErrorResponse(err) if err.is_conflict())
    }

    /// True for store-side throttling (429).
    pub fn is_throttled(&self) -> bool {
        matches!(self, ModelError::ErrorResponse(err) if err.is_throttled())
    }
}

impl From<StoreError> for ModelError {
    fn from(err: StoreError) -> Self {
        ModelError::ErrorResponse(err)
    }
}

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Decoding(errors)
    }
}

/// Rejected model configuration. Returned by constructors before any
/// operation can run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("container name must not be empty")]
    EmptyContainer,

    #[error("field `{0}` is reserved for store or version bookkeeping")]
    ReservedField(&'static str),

    #[error("model id field and partition key field must differ (both are `{0}`)")]
    KeyCollapse(&'static str),

    #[error("single-key model needs partition key `{partition_key_field}` to be the model id field `{model_id_field}`")]
    SplitKey {
        model_id_field: &'static str,
        partition_key_field: &'static str,
    },
}
