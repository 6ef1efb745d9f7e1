//! Core type definitions for the ODM.
//!
//! This crate defines the storage-agnostic types shared by every layer:
//! - Document identifiers (UUID v7)
//! - Reference tokens (`collection:id` pointers between documents)
//! - [`Value`], the dynamic value accepted by fields and handed to backends
//!
//! Field kinds, entities and hooks live in `odm-model`; persistence lives in
//! `odm-storage`.

mod ids;
mod reference;
mod value;

pub use ids::DocumentId;
pub use reference::RefToken;
pub use value::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid reference token: {0}")]
    InvalidToken(String),
}
