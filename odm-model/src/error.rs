//! Error types for fields and entities.

use odm_storage::StorageError;
use thiserror::Error;

/// Result type for model operations.
pub type OdmResult<T> = Result<T, OdmError>;

/// Errors raised by fields, entities and the model registry.
#[derive(Debug, Error)]
pub enum OdmError {
    /// The value does not have a shape the field kind accepts.
    #[error("field '{field}': {message}")]
    TypeKind { field: String, message: String },

    /// The operation is not defined for the field kind.
    #[error("field '{field}' of kind {kind} does not support {op}")]
    UnsupportedOperation {
        field: String,
        kind: &'static str,
        op: &'static str,
    },

    /// A required field is empty.
    #[error("value of the field '{field}' cannot be empty")]
    ConstraintViolation { field: String },

    /// A unique index already holds the same tuple of values.
    #[error("unique index ({}) of model '{model}' already holds these values", fields.join(", "))]
    UniqueConstraintViolation { model: String, fields: Vec<String> },

    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    /// Deletion vetoed by a hook or by sentinel policy.
    #[error("delete forbidden: {0}")]
    ForbidDelete(String),

    /// Save vetoed by a hook or by sentinel policy.
    #[error("save forbidden: {0}")]
    ForbidSave(String),

    /// The entity has no id yet, so nothing can point at it.
    #[error("entity of model '{0}' has not been saved")]
    NotSaved(String),

    /// A reference field was read without a resolver attached.
    #[error("field '{0}' has no resolver")]
    MissingResolver(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid datetime format: {0}")]
    InvalidFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OdmError {
    pub(crate) fn type_kind(field: &str, message: impl Into<String>) -> Self {
        Self::TypeKind {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Maps a backend error raised while storing a document of `model`.
    pub(crate) fn from_store(err: StorageError, model: &str) -> Self {
        match err {
            StorageError::UniqueViolation { fields, .. } => Self::UniqueConstraintViolation {
                model: model.to_string(),
                fields,
            },
            other => Self::Storage(other),
        }
    }
}
