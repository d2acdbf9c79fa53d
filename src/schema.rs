//! Schema checks applied to every document crossing the store boundary.
//!
//! The write shape of an entity is the entity type itself; the read shape is
//! [`Retrieved<T>`](crate::Retrieved), the entity plus store metadata. Both
//! go through serde for structure and [`Validate`] for field-level rules.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// One failed rule, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Ordered collection of validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(path, message);
        errors
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.path, err.message)?;
        }
        Ok(())
    }
}

impl From<serde_json::Error> for ValidationErrors {
    fn from(err: serde_json::Error) -> Self {
        ValidationErrors::single("/", err.to_string())
    }
}

/// Field-level rules for an entity shape.
///
/// Structural checks (required fields, types) come from serde; implement
/// this for everything serde cannot express, such as formats and ranges.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Validate an outbound document and turn it into JSON.
pub(crate) fn encode<T: Serialize + Validate>(value: &T) -> Result<Value, ValidationErrors> {
    value.validate()?;
    let json = serde_json::to_value(value)?;
    if !json.is_object() {
        return Err(ValidationErrors::single("/", "document must be a JSON object"));
    }
    Ok(json)
}

/// Decode and validate an inbound resource. Nothing is returned unless the
/// whole value passes.
pub(crate) fn decode<T: DeserializeOwned + Validate>(value: Value) -> Result<T, ValidationErrors> {
    let decoded: T = serde_json::from_value(value)?;
    decoded.validate()?;
    Ok(decoded)
}
