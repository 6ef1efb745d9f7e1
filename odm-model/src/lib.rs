//! Typed fields and schema-defined entities.
//!
//! - [`Field`] / [`FieldKind`]: one named, validated attribute
//! - [`SchemaBuilder`] / [`ModelSchema`]: a model's fields and indexes
//! - [`EntityHooks`]: per-model behaviour around field access, save and delete
//! - [`Entity`]: one document with its save/delete/reload lifecycle
//! - [`Odm`]: the model registry, bound to one [`odm_storage::Backend`]
//!
//! Reference fields store [`odm_types::RefToken`]s and resolve them through
//! the registry when read. A reference whose target is gone reads as nothing.

mod config;
mod entity;
mod error;
mod field;
mod hooks;
mod registry;
mod schema;

pub use config::OdmConfig;
pub use entity::{CREATED_FIELD, Entity, MODIFIED_FIELD};
pub use error::{OdmError, OdmResult};
pub use field::{Field, FieldKind, FieldValue, GetOptions, Resolver};
pub use hooks::EntityHooks;
pub use registry::Odm;
pub use schema::{ModelSchema, SYSTEM_PREFIX, SchemaBuilder};
