use crate::field::Field;
use crate::hooks::EntityHooks;
use crate::{OdmError, OdmResult};
use odm_storage::IndexSpec;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Field names starting with this prefix are reserved for system fields.
pub const SYSTEM_PREFIX: char = '_';

/// Collects field and index definitions while a model's `setup` runs.
#[derive(Debug)]
pub struct SchemaBuilder {
    model: String,
    fields: Vec<Field>,
    indexes: Vec<IndexSpec>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Adds a field. Fields keep definition order.
    pub fn define_field(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Removes a previously defined field, e.g. one inherited from a base
    /// model's setup.
    pub fn remove_field(&mut self, name: &str) -> &mut Self {
        self.fields.retain(|f| f.name() != name);
        self
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    /// Toggles the non-empty constraint of an already defined field.
    pub fn set_required(&mut self, name: &str, required: bool) -> &mut Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name() == name) {
            field.set_required(required);
        }
        self
    }

    pub fn define_index<S: Into<String>>(
        &mut self,
        fields: impl IntoIterator<Item = S>,
        unique: bool,
    ) -> &mut Self {
        self.indexes.push(IndexSpec::new(
            fields.into_iter().map(Into::into).collect(),
            unique,
        ));
        self
    }

    pub(crate) fn build(self, hooks: Arc<dyn EntityHooks>) -> OdmResult<ModelSchema> {
        if self.model.is_empty() {
            return Err(OdmError::InvalidSchema("model name is empty".into()));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name().is_empty() || field.name().starts_with(SYSTEM_PREFIX) {
                return Err(OdmError::InvalidSchema(format!(
                    "model '{}': invalid field name '{}'",
                    self.model,
                    field.name()
                )));
            }
            if !names.insert(field.name()) {
                return Err(OdmError::InvalidSchema(format!(
                    "model '{}': field '{}' defined twice",
                    self.model,
                    field.name()
                )));
            }
            field.validate_default().map_err(|e| {
                OdmError::InvalidSchema(format!("model '{}': bad default: {e}", self.model))
            })?;
        }

        for index in &self.indexes {
            if index.fields.is_empty() {
                return Err(OdmError::InvalidSchema(format!(
                    "model '{}': empty index",
                    self.model
                )));
            }
            if let Some(unknown) = index.fields.iter().find(|f| !names.contains(f.as_str())) {
                return Err(OdmError::InvalidSchema(format!(
                    "model '{}': index over unknown field '{unknown}'",
                    self.model
                )));
            }
        }

        Ok(ModelSchema {
            model: self.model,
            fields: self.fields,
            indexes: self.indexes,
            hooks,
        })
    }
}

/// A registered model: its fields (as templates), indexes and hooks.
///
/// Immutable once registered and shared by every entity of the model.
pub struct ModelSchema {
    model: String,
    fields: Vec<Field>,
    indexes: Vec<IndexSpec>,
    hooks: Arc<dyn EntityHooks>,
}

impl ModelSchema {
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Field templates in definition order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().filter(|ix| ix.unique)
    }

    #[must_use]
    pub fn hooks(&self) -> &Arc<dyn EntityHooks> {
        &self.hooks
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("model", &self.model)
            .field("fields", &self.fields)
            .field("indexes", &self.indexes)
            .finish_non_exhaustive()
    }
}
