use crate::config::OdmConfig;
use crate::entity::Entity;
use crate::field::Resolver;
use crate::hooks::EntityHooks;
use crate::schema::{ModelSchema, SchemaBuilder};
use crate::{OdmError, OdmResult};
use odm_storage::{Backend, StorageError};
use odm_types::{DocumentId, RefToken, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info};

type Models = HashMap<String, Arc<ModelSchema>>;

/// Model registry bound to one backend.
///
/// Holds every registered [`ModelSchema`], creates and loads entities, and
/// resolves reference tokens for reference fields. Always shared as
/// `Arc<Odm>`; entities keep a handle to the registry that made them.
pub struct Odm {
    this: Weak<Odm>,
    backend: Arc<dyn Backend>,
    config: OdmConfig,
    models: RwLock<Models>,
}

impl Odm {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Self::with_config(backend, OdmConfig::default())
    }

    #[must_use]
    pub fn with_config(backend: Arc<dyn Backend>, config: OdmConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            backend,
            config,
            models: RwLock::new(HashMap::new()),
        })
    }

    fn handle(&self) -> Arc<Self> {
        // Odm is only ever constructed inside an Arc.
        self.this
            .upgrade()
            .expect("Odm is always owned by an Arc")
    }

    fn read_models(&self) -> OdmResult<RwLockReadGuard<'_, Models>> {
        self.models
            .read()
            .map_err(|_| OdmError::Storage(StorageError::LockPoisoned))
    }

    fn write_models(&self) -> OdmResult<RwLockWriteGuard<'_, Models>> {
        self.models
            .write()
            .map_err(|_| OdmError::Storage(StorageError::LockPoisoned))
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    #[must_use]
    pub const fn config(&self) -> &OdmConfig {
        &self.config
    }

    // ── Models ──────────────────────────────────────────────────

    /// Runs the model's `setup`, validates the resulting schema and
    /// declares its indexes to the backend.
    pub fn register_model(&self, hooks: impl EntityHooks + 'static) -> OdmResult<Arc<ModelSchema>> {
        let hooks: Arc<dyn EntityHooks> = Arc::new(hooks);
        let mut builder = SchemaBuilder::new(hooks.model());
        hooks.setup(&mut builder);
        let schema = Arc::new(builder.build(Arc::clone(&hooks))?);

        let mut models = self.write_models()?;
        if models.contains_key(schema.model()) {
            return Err(OdmError::InvalidSchema(format!(
                "model '{}' is already registered",
                schema.model()
            )));
        }

        for index in schema.indexes() {
            if index.unique && !self.config.backend_unique_indexes {
                continue;
            }
            self.backend.define_index(schema.model(), index.clone())?;
        }

        info!(
            model = %schema.model(),
            fields = schema.fields().len(),
            indexes = schema.indexes().len(),
            "Model registered"
        );
        models.insert(schema.model().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Forgets a model. Stored documents are left alone.
    pub fn unregister_model(&self, model: &str) -> OdmResult<()> {
        if self.write_models()?.remove(model).is_none() {
            return Err(OdmError::UnknownModel(model.to_string()));
        }
        info!(model = %model, "Model unregistered");
        Ok(())
    }

    #[must_use]
    pub fn is_model_registered(&self, model: &str) -> bool {
        self.read_models()
            .map(|models| models.contains_key(model))
            .unwrap_or(false)
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> OdmResult<Vec<String>> {
        let mut names: Vec<String> = self.read_models()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn schema(&self, model: &str) -> OdmResult<Arc<ModelSchema>> {
        self.read_models()?
            .get(model)
            .cloned()
            .ok_or_else(|| OdmError::UnknownModel(model.to_string()))
    }

    // ── Entities ────────────────────────────────────────────────

    /// A new, unsaved entity with every field at its default.
    pub fn dispense(&self, model: &str) -> OdmResult<Entity> {
        let schema = self.schema(model)?;
        Ok(Entity::new(self.handle(), schema))
    }

    pub fn get(&self, model: &str, id: &DocumentId) -> OdmResult<Option<Entity>> {
        let schema = self.schema(model)?;
        let doc = self.backend.get(model, id)?;
        Ok(doc.map(|doc| Entity::hydrate(self.handle(), schema, doc)))
    }

    /// Loads the entity a token points at; `None` if it no longer exists.
    pub fn get_by_ref(&self, token: &RefToken) -> OdmResult<Option<Entity>> {
        let schema = self.schema(token.collection())?;
        let doc = self.backend.resolve(token)?;
        if doc.is_none() {
            debug!(token = %token, "Reference did not resolve");
        }
        Ok(doc.map(|doc| Entity::hydrate(self.handle(), schema, doc)))
    }

    /// Interprets a reference value or a `collection:id` string as a token
    /// of a registered model. `Null` and empty strings give `None`.
    pub fn resolve_ref(&self, value: &Value) -> OdmResult<Option<RefToken>> {
        let token = match value {
            Value::Null => return Ok(None),
            Value::String(s) if s.is_empty() => return Ok(None),
            Value::Ref(token) => token.clone(),
            Value::String(s) => s
                .parse::<RefToken>()
                .map_err(|e| OdmError::type_kind("<ref>", e.to_string()))?,
            other => {
                return Err(OdmError::type_kind(
                    "<ref>",
                    format!("reference expected, got {}", other.type_name()),
                ));
            }
        };
        if !self.is_model_registered(token.collection()) {
            return Err(OdmError::UnknownModel(token.collection().to_string()));
        }
        Ok(Some(token))
    }

    fn load_all(&self, model: &str, ids: Vec<DocumentId>) -> OdmResult<Vec<Entity>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.get(model, &id)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Entities whose `fields` equal `values` position by position.
    pub fn find_equals(
        &self,
        model: &str,
        fields: &[&str],
        values: &[Value],
    ) -> OdmResult<Vec<Entity>> {
        self.schema(model)?;
        let fields: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
        let ids = self.backend.query_equals(model, &fields, values)?;
        self.load_all(model, ids)
    }

    /// Entities whose `field` equals `value` or, for lists, contains it.
    pub fn find_contains(&self, model: &str, field: &str, value: &Value) -> OdmResult<Vec<Entity>> {
        self.schema(model)?;
        let ids = self.backend.query_contains(model, field, value)?;
        self.load_all(model, ids)
    }
}

impl Resolver for Odm {
    fn resolve(&self, token: &RefToken) -> OdmResult<Option<Entity>> {
        self.get_by_ref(token)
    }
}

impl fmt::Debug for Odm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Odm")
            .field("config", &self.config)
            .field("models", &self.model_names().unwrap_or_default())
            .finish_non_exhaustive()
    }
}
