//! Storage layer for the ODM.
//!
//! Entities never talk to a database directly. They go through the
//! [`Backend`] trait, which covers exactly what the entity lifecycle needs:
//! get/store/remove by id, reference resolution, and the equality and
//! set-membership queries behind unique-index checks.
//!
//! # Architecture
//!
//! - Documents are maps of field name to [`odm_types::Value`]
//! - References are stored as tokens and resolved on demand
//! - [`MemoryBackend`] is the in-process implementation; it enforces unique
//!   indexes natively and can be snapshotted to a JSON file

mod backend;
mod error;
mod memory;

pub use backend::{Backend, Document, Fields, IndexSpec};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
