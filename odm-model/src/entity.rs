use crate::field::{Field, FieldValue, GetOptions, Resolver, format_datetime};
use crate::registry::Odm;
use crate::schema::ModelSchema;
use crate::{OdmError, OdmResult};
use chrono::{DateTime, SecondsFormat, Utc};
use odm_storage::{Document, Fields, StorageError};
use odm_types::{DocumentId, RefToken, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored name of the creation timestamp.
pub const CREATED_FIELD: &str = "_created";
/// Stored name of the last-save timestamp.
pub const MODIFIED_FIELD: &str = "_modified";

/// One document of a registered model.
///
/// Fields are reached by name only; every mutation goes through the model's
/// hooks and then the field's own validation. Obtain entities from [`Odm`]:
/// `dispense` for new ones, `get`/`get_by_ref` for stored ones.
#[derive(Clone)]
pub struct Entity {
    odm: Arc<Odm>,
    schema: Arc<ModelSchema>,
    id: Option<DocumentId>,
    fields: Vec<Field>,
    is_new: bool,
    is_deleted: bool,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
}

impl Entity {
    pub(crate) fn new(odm: Arc<Odm>, schema: Arc<ModelSchema>) -> Self {
        let resolver: Arc<dyn Resolver> = odm.clone();
        let heal = odm.config().heal_dangling_refs;
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                f.clone()
                    .with_resolver(Arc::clone(&resolver))
                    .heal_dangling(heal)
            })
            .collect();

        Self {
            odm,
            schema,
            id: None,
            fields,
            is_new: true,
            is_deleted: false,
            created: None,
            modified: None,
        }
    }

    /// Builds an entity from a stored document without dirtying any field.
    pub(crate) fn hydrate(odm: Arc<Odm>, schema: Arc<ModelSchema>, doc: Document) -> Self {
        let mut entity = Self::new(odm, schema);
        entity.id = Some(doc.id);
        entity.is_new = false;

        for (name, value) in doc.fields {
            match name.as_str() {
                CREATED_FIELD => entity.created = value.as_datetime().copied(),
                MODIFIED_FIELD => entity.modified = value.as_datetime().copied(),
                _ => match entity.fields.iter_mut().find(|f| f.name() == name) {
                    Some(field) => {
                        if let Err(e) = field.load(value) {
                            warn!(
                                model = %entity.schema.model(),
                                id = %doc.id,
                                field = %name,
                                "Stored value rejected, keeping default: {}",
                                e
                            );
                        }
                    }
                    None => debug!(
                        model = %entity.schema.model(),
                        field = %name,
                        "Ignoring stored field unknown to the schema"
                    ),
                },
            }
        }
        entity
    }

    // ── Identity ────────────────────────────────────────────────

    #[must_use]
    pub fn model(&self) -> &str {
        self.schema.model()
    }

    #[must_use]
    pub const fn id(&self) -> Option<DocumentId> {
        self.id
    }

    /// True until the first successful save.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    #[must_use]
    pub const fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    #[must_use]
    pub const fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    #[must_use]
    pub const fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// The registry this entity belongs to.
    #[must_use]
    pub const fn odm(&self) -> &Arc<Odm> {
        &self.odm
    }

    /// Token pointing at this entity. Fails for unsaved entities.
    pub fn to_ref(&self) -> OdmResult<RefToken> {
        let id = self
            .id
            .ok_or_else(|| OdmError::NotSaved(self.model().to_string()))?;
        Ok(self.odm.backend().token_of(self.model(), id))
    }

    /// Reference value for assigning this entity to a reference field.
    pub fn to_value(&self) -> OdmResult<Value> {
        self.to_ref().map(Value::Ref)
    }

    // ── Field access ────────────────────────────────────────────

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn unknown(&self, name: &str) -> OdmError {
        OdmError::UnknownField {
            model: self.model().to_string(),
            field: name.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> OdmResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| self.unknown(name))
    }

    fn field_mut(&mut self, name: &str) -> OdmResult<&mut Field> {
        match self.fields.iter().position(|f| f.name() == name) {
            Some(pos) => Ok(&mut self.fields[pos]),
            None => Err(self.unknown(name)),
        }
    }

    /// Raw value of a field, without resolution or hooks.
    pub fn field_value(&self, name: &str) -> OdmResult<&Value> {
        self.field(name).map(Field::value)
    }

    /// String value of a field, `None` for other shapes or unknown names.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.field_value(name).ok().and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.field_value(name).ok().and_then(Value::as_int)
    }

    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.field_value(name).ok().and_then(Value::as_float)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.field_value(name).ok().and_then(Value::as_bool)
    }

    /// Reads a field through resolution and the model's get hook.
    pub fn field_get(&mut self, name: &str) -> OdmResult<FieldValue> {
        self.field_get_with(name, &GetOptions::default())
    }

    pub fn field_get_with(&mut self, name: &str, opts: &GetOptions) -> OdmResult<FieldValue> {
        let value = self.field_mut(name)?.get(opts)?;
        let hooks = Arc::clone(self.schema.hooks());
        hooks.on_field_get(self, name, value, opts)
    }

    pub fn field_set(&mut self, name: &str, value: impl Into<Value>) -> OdmResult<&mut Self> {
        self.field(name)?;
        let hooks = Arc::clone(self.schema.hooks());
        let value = hooks.on_field_set(self, name, value.into())?;
        self.field_mut(name)?.set(value)?;
        Ok(self)
    }

    pub fn field_add(&mut self, name: &str, value: impl Into<Value>) -> OdmResult<&mut Self> {
        self.field(name)?;
        let hooks = Arc::clone(self.schema.hooks());
        let value = hooks.on_field_add(self, name, value.into())?;
        self.field_mut(name)?.add(value)?;
        Ok(self)
    }

    pub fn field_sub(&mut self, name: &str, value: impl Into<Value>) -> OdmResult<&mut Self> {
        self.field(name)?;
        let hooks = Arc::clone(self.schema.hooks());
        let value = hooks.on_field_sub(self, name, value.into())?;
        self.field_mut(name)?.sub(value)?;
        Ok(self)
    }

    /// Increments a number field; the delta passes through `on_field_add`.
    pub fn field_inc(&mut self, name: &str, delta: impl Into<Value>) -> OdmResult<&mut Self> {
        self.field(name)?;
        let hooks = Arc::clone(self.schema.hooks());
        let delta = hooks.on_field_add(self, name, delta.into())?;
        self.field_mut(name)?.increment(delta)?;
        Ok(self)
    }

    /// Decrements a number field; the delta passes through `on_field_sub`.
    pub fn field_dec(&mut self, name: &str, delta: impl Into<Value>) -> OdmResult<&mut Self> {
        self.field(name)?;
        let hooks = Arc::clone(self.schema.hooks());
        let delta = hooks.on_field_sub(self, name, delta.into())?;
        self.field_mut(name)?.decrement(delta)?;
        Ok(self)
    }

    /// Resets a field to its default.
    pub fn field_clear(&mut self, name: &str) -> OdmResult<&mut Self> {
        self.field_mut(name)?.clear();
        Ok(self)
    }

    /// Names of fields changed since the last save or load.
    #[must_use]
    pub fn modified_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_modified())
            .map(Field::name)
            .collect()
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.fields.iter().any(Field::is_modified)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    fn storable(&self) -> OdmResult<Fields> {
        let mut doc = Fields::new();
        for field in &self.fields {
            if let Some(value) = field.storable_value()? {
                doc.insert(field.name().to_string(), value);
            }
        }
        Ok(doc)
    }

    /// Advisory check; the backend's own unique indexes are authoritative.
    fn check_unique(&self, doc: &Fields) -> OdmResult<()> {
        let backend = self.odm.backend();
        for index in self.schema.unique_indexes() {
            let values = index.tuple_of(doc);
            let hits = backend.query_equals(self.model(), &index.fields, &values)?;
            if hits.iter().any(|hit| Some(*hit) != self.id) {
                return Err(OdmError::UniqueConstraintViolation {
                    model: self.model().to_string(),
                    fields: index.fields.clone(),
                });
            }
        }
        Ok(())
    }

    /// Persists the entity.
    ///
    /// Runs `pre_save`, collects storable values, checks unique indexes,
    /// stores the document, runs `after_save`, then clears dirty flags.
    /// Nothing is written if any step before the store fails.
    pub fn save(&mut self) -> OdmResult<&mut Self> {
        let hooks = Arc::clone(self.schema.hooks());
        if self.is_deleted {
            return Err(OdmError::ForbidSave(format!(
                "entity of model '{}' has been deleted",
                self.model()
            )));
        }
        if hooks.is_sentinel(self) {
            return Err(OdmError::ForbidSave(format!(
                "sentinel entity of model '{}' cannot be saved",
                self.model()
            )));
        }

        hooks.pre_save(self)?;

        let mut doc = self.storable()?;
        self.check_unique(&doc)?;

        let now = Utc::now();
        let created = self.created.unwrap_or(now);
        doc.insert(CREATED_FIELD.to_string(), Value::DateTime(created));
        doc.insert(MODIFIED_FIELD.to_string(), Value::DateTime(now));

        let first_save = self.is_new;
        let id = self
            .odm
            .backend()
            .store(self.model(), self.id, doc)
            .map_err(|e| OdmError::from_store(e, self.model()))?;

        self.id = Some(id);
        self.is_new = false;
        self.created = Some(created);
        self.modified = Some(now);
        debug!(model = %self.model(), id = %id, first_save, "Entity saved");

        hooks.after_save(self, first_save)?;

        for field in &mut self.fields {
            field.reset_modified();
        }
        Ok(self)
    }

    /// Removes the entity from the backend.
    pub fn delete(&mut self) -> OdmResult<()> {
        let hooks = Arc::clone(self.schema.hooks());
        if hooks.is_sentinel(self) {
            return Err(OdmError::ForbidDelete(format!(
                "sentinel entity of model '{}' cannot be deleted",
                self.model()
            )));
        }
        let Some(id) = self.id else {
            return Err(OdmError::ForbidDelete(format!(
                "entity of model '{}' has not been saved",
                self.model()
            )));
        };
        if self.is_deleted {
            return Err(OdmError::ForbidDelete(format!(
                "entity {}:{id} is already deleted",
                self.model()
            )));
        }

        hooks.pre_delete(self)?;
        self.odm.backend().remove(self.model(), &id)?;
        self.is_deleted = true;
        debug!(model = %self.model(), id = %id, "Entity deleted");

        hooks.after_delete(self)
    }

    /// Discards in-memory changes by re-reading the stored document.
    pub fn reload(&mut self) -> OdmResult<()> {
        let token = self.to_ref()?;
        let doc = self
            .odm
            .backend()
            .get(self.model(), &token.id())?
            .ok_or_else(|| StorageError::NotFound(token.to_string()))?;
        *self = Self::hydrate(Arc::clone(&self.odm), Arc::clone(&self.schema), doc);
        Ok(())
    }

    /// Plain JSON rendering: system fields plus every field's raw value.
    pub fn as_jsonable(&self) -> OdmResult<serde_json::Value> {
        let format = self.odm.config().datetime_format.as_deref();
        let stamp = |dt: Option<DateTime<Utc>>| -> OdmResult<serde_json::Value> {
            Ok(match (dt, format) {
                (None, _) => serde_json::Value::Null,
                (Some(dt), Some(format)) => format_datetime(&dt, format)?.into(),
                (Some(dt), None) => dt.to_rfc3339_opts(SecondsFormat::Secs, true).into(),
            })
        };

        let mut map = serde_json::Map::new();
        map.insert(
            "_id".into(),
            self.id
                .map_or(serde_json::Value::Null, |id| id.to_string().into()),
        );
        map.insert("_model".into(), self.model().into());
        map.insert(CREATED_FIELD.into(), stamp(self.created)?);
        map.insert(MODIFIED_FIELD.into(), stamp(self.modified)?);
        for field in &self.fields {
            map.insert(field.name().to_string(), field.jsonable(format)?);
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model())
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
