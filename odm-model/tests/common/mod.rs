//! Shared fixture models for odm-model tests.

#![allow(dead_code)]

use odm_model::{
    Entity, EntityHooks, Field, FieldValue, GetOptions, Odm, OdmConfig, OdmError, OdmResult,
    SchemaBuilder,
};
use odm_storage::{
    Backend, Document, Fields, IndexSpec, MemoryBackend, StorageResult,
};
use odm_types::{DocumentId, RefToken, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ANONYMOUS_LOGIN: &str = "anonymous@anonymous.anonymous";

/// Stand-in for a real password hash; enough to tell hashed from plain.
pub fn fake_hash(plain: &str) -> String {
    format!("hash:{}", plain.chars().rev().collect::<String>())
}

// ── Models ──────────────────────────────────────────────────────

pub struct UserModel;

impl EntityHooks for UserModel {
    fn model(&self) -> &str {
        "user"
    }

    fn setup(&self, schema: &mut SchemaBuilder) {
        schema
            .define_field(Field::string("login").required())
            .define_field(Field::string("password").required())
            .define_field(Field::string("token"))
            .define_field(Field::string("first_name"))
            .define_field(Field::string("last_name"))
            .define_field(Field::virtual_field("full_name"))
            .define_field(Field::integer("visits"))
            .define_field(Field::datetime("last_activity"))
            .define_field(Field::ref_list("roles", "role"))
            .define_field(Field::reference("picture", "image"))
            .define_field(Field::dict("options"))
            .define_index(["login"], true)
            .define_index(["token"], true);
    }

    fn is_sentinel(&self, entity: &Entity) -> bool {
        entity.get_str("login") == Some(ANONYMOUS_LOGIN)
    }

    fn on_field_set(&self, _entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        match (field, &value) {
            ("password", Value::String(plain)) if !plain.trim().is_empty() => {
                Ok(Value::String(fake_hash(plain.trim())))
            }
            _ => Ok(value),
        }
    }

    fn on_field_get(
        &self,
        entity: &mut Entity,
        field: &str,
        value: FieldValue,
        _opts: &GetOptions,
    ) -> OdmResult<FieldValue> {
        if field == "full_name" {
            let first = entity.get_str("first_name").unwrap_or_default();
            let last = entity.get_str("last_name").unwrap_or_default();
            let full = format!("{first} {last}").trim().to_string();
            return Ok(FieldValue::Value(Value::String(full)));
        }
        Ok(value)
    }

    fn pre_save(&self, entity: &mut Entity) -> OdmResult<()> {
        if entity.get_str("token").unwrap_or_default().is_empty() {
            entity.field_set("token", DocumentId::new().to_string())?;
        }
        Ok(())
    }
}

pub struct RoleModel;

impl EntityHooks for RoleModel {
    fn model(&self) -> &str {
        "role"
    }

    fn setup(&self, schema: &mut SchemaBuilder) {
        schema
            .define_field(Field::string("name").required())
            .define_field(Field::unique_list("permissions"))
            .define_index(["name"], true);
    }
}

pub struct ImageModel;

impl EntityHooks for ImageModel {
    fn model(&self) -> &str {
        "image"
    }

    fn setup(&self, schema: &mut SchemaBuilder) {
        schema
            .define_field(Field::string("path").required())
            .define_field(Field::integer("width"))
            .define_field(Field::integer("height"));
    }
}

pub struct TagModel;

impl EntityHooks for TagModel {
    fn model(&self) -> &str {
        "tag"
    }

    fn setup(&self, schema: &mut SchemaBuilder) {
        schema
            .define_field(Field::string("title").required())
            .define_field(Field::integer("weight"))
            .define_index(["title"], true);
    }

    fn pre_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        let token = entity.to_value()?;
        let users = entity.odm().find_contains("article", "tags", &token)?;
        if !users.is_empty() {
            return Err(OdmError::ForbidDelete(format!(
                "tag is used by {} article(s)",
                users.len()
            )));
        }
        Ok(())
    }
}

pub struct ArticleModel;

impl EntityHooks for ArticleModel {
    fn model(&self) -> &str {
        "article"
    }

    fn setup(&self, schema: &mut SchemaBuilder) {
        schema
            .define_field(Field::string("title").required())
            .define_field(Field::string("body"))
            .define_field(Field::reference("author", "user"))
            .define_field(Field::unique_ref_list("tags", "tag"))
            .define_field(Field::ref_list("images", "image"))
            .define_field(Field::datetime("publish_time"))
            .define_field(Field::float("rating"))
            .define_field(Field::bool("starred"))
            .define_field(Field::unique_list("keywords"));
    }

    fn after_save(&self, entity: &mut Entity, first_save: bool) -> OdmResult<()> {
        if !first_save {
            return Ok(());
        }
        for mut tag in entity.field_get("tags")?.into_entities() {
            tag.field_inc("weight", 1)?;
            tag.save()?;
        }
        Ok(())
    }

    fn after_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        for mut image in entity.field_get("images")?.into_entities() {
            image.delete()?;
        }
        Ok(())
    }
}

// ── Registries ──────────────────────────────────────────────────

pub fn register_all(odm: &Odm) {
    odm.register_model(UserModel).unwrap();
    odm.register_model(RoleModel).unwrap();
    odm.register_model(ImageModel).unwrap();
    odm.register_model(TagModel).unwrap();
    odm.register_model(ArticleModel).unwrap();
}

/// Registry over a fresh memory backend with every fixture model.
pub fn odm() -> Arc<Odm> {
    odm_on(Arc::new(MemoryBackend::new()))
}

pub fn odm_on(backend: Arc<dyn Backend>) -> Arc<Odm> {
    odm_with(backend, OdmConfig::default())
}

pub fn odm_with(backend: Arc<dyn Backend>, config: OdmConfig) -> Arc<Odm> {
    let odm = Odm::with_config(backend, config);
    register_all(&odm);
    odm
}

// ── Entities ────────────────────────────────────────────────────

pub fn saved_user(odm: &Odm, login: &str) -> Entity {
    let mut user = odm.dispense("user").unwrap();
    user.field_set("login", login).unwrap();
    user.field_set("password", "secret").unwrap();
    user.save().unwrap();
    user
}

pub fn saved_tag(odm: &Odm, title: &str) -> Entity {
    let mut tag = odm.dispense("tag").unwrap();
    tag.field_set("title", title).unwrap();
    tag.save().unwrap();
    tag
}

pub fn saved_image(odm: &Odm, path: &str) -> Entity {
    let mut image = odm.dispense("image").unwrap();
    image.field_set("path", path).unwrap();
    image.save().unwrap();
    image
}

// ── Backends ────────────────────────────────────────────────────

/// Memory backend that counts writes, for asserting that a failed save
/// never reaches storage.
#[derive(Default)]
pub struct CountingBackend {
    pub inner: MemoryBackend,
    stores: AtomicUsize,
    removes: AtomicUsize,
}

impl CountingBackend {
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    fn get(&self, collection: &str, id: &DocumentId) -> StorageResult<Option<Document>> {
        self.inner.get(collection, id)
    }

    fn store(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        fields: Fields,
    ) -> StorageResult<DocumentId> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(collection, id, fields)
    }

    fn remove(&self, collection: &str, id: &DocumentId) -> StorageResult<bool> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(collection, id)
    }

    fn query_equals(
        &self,
        collection: &str,
        fields: &[String],
        values: &[Value],
    ) -> StorageResult<Vec<DocumentId>> {
        self.inner.query_equals(collection, fields, values)
    }

    fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<Vec<DocumentId>> {
        self.inner.query_contains(collection, field, value)
    }

    fn define_index(&self, collection: &str, index: IndexSpec) -> StorageResult<()> {
        self.inner.define_index(collection, index)
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        self.inner.collections()
    }

    fn ids(&self, collection: &str) -> StorageResult<Vec<DocumentId>> {
        self.inner.ids(collection)
    }
}

/// Token of a document that was never stored.
pub fn token(collection: &str) -> RefToken {
    RefToken::new(collection, DocumentId::new())
}
