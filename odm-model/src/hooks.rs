use crate::entity::Entity;
use crate::field::{FieldValue, GetOptions};
use crate::schema::SchemaBuilder;
use crate::OdmResult;
use odm_types::Value;

/// Per-model behaviour: schema definition plus lifecycle hooks.
///
/// Only `model` and `setup` are required. Everything else defaults to a
/// no-op, so a plain model is just a name and a list of fields.
///
/// Implement the hooks when you need:
/// - Derived fields (e.g. hash a password on set, build a full name on save)
/// - Computed reads (virtual fields filled in by `on_field_get`)
/// - Save/delete vetoes (sentinel users, terms still in use)
/// - Cascades (saving or deleting owned entities after the fact)
pub trait EntityHooks: Send + Sync {
    /// Collection name of the model.
    fn model(&self) -> &str;

    /// Declares fields and indexes.
    fn setup(&self, schema: &mut SchemaBuilder);

    /// Sentinel entities can be neither saved nor deleted.
    fn is_sentinel(&self, entity: &Entity) -> bool {
        let _ = entity;
        false
    }

    /// Runs before the field validates a set. May transform the value or
    /// reject it.
    fn on_field_set(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    /// Runs before the field validates an add or an increment.
    fn on_field_add(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    /// Runs before the field validates a sub or a decrement.
    fn on_field_sub(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    /// Runs after the field has been read and resolved.
    fn on_field_get(
        &self,
        entity: &mut Entity,
        field: &str,
        value: FieldValue,
        opts: &GetOptions,
    ) -> OdmResult<FieldValue> {
        let _ = (entity, field, opts);
        Ok(value)
    }

    /// Runs first in `save`. Return an error to abort the save.
    fn pre_save(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }

    /// Runs once the document has been stored.
    fn after_save(&self, entity: &mut Entity, first_save: bool) -> OdmResult<()> {
        let _ = (entity, first_save);
        Ok(())
    }

    /// Runs first in `delete`. Return `ForbidDelete` to veto.
    fn pre_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }

    /// Runs once the document has been removed.
    fn after_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }
}
