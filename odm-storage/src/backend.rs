//! The persistence/resolution contract consumed by entities.

use crate::StorageResult;
use odm_types::{DocumentId, RefToken, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storable field values of one document, keyed by field name.
pub type Fields = BTreeMap<String, Value>;

/// A stored document as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub collection: String,
    pub fields: Fields,
}

impl Document {
    /// Value of a stored field, `None` when the field is absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn token(&self) -> RefToken {
        RefToken::new(self.collection.clone(), self.id)
    }
}

/// An index declared by a model schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    #[must_use]
    pub fn new(fields: Vec<String>, unique: bool) -> Self {
        Self { fields, unique }
    }

    /// Shorthand for a unique index.
    #[must_use]
    pub fn unique<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::new(fields.into_iter().map(Into::into).collect(), true)
    }

    /// Values of the indexed fields in `fields`, absent fields read as null.
    #[must_use]
    pub fn tuple_of(&self, fields: &Fields) -> Vec<Value> {
        self.fields
            .iter()
            .map(|name| fields.get(name).cloned().unwrap_or_default())
            .collect()
    }
}

/// A document-oriented store.
///
/// Calls are synchronous and carry no timeout; implementations that talk to
/// a remote database manage their own connection pool. Writes of a single
/// document are expected to be atomic.
pub trait Backend: Send + Sync {
    /// Fetch one document.
    fn get(&self, collection: &str, id: &DocumentId) -> StorageResult<Option<Document>>;

    /// Resolve a reference token to the current document, `None` when it no
    /// longer exists.
    fn resolve(&self, token: &RefToken) -> StorageResult<Option<Document>> {
        self.get(token.collection(), &token.id())
    }

    /// Insert or replace a document. `None` inserts under a fresh id.
    /// Returns the id the document is stored under.
    fn store(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        fields: Fields,
    ) -> StorageResult<DocumentId>;

    /// Delete a document. Returns whether anything was removed.
    fn remove(&self, collection: &str, id: &DocumentId) -> StorageResult<bool>;

    /// Ids of documents whose `fields` equal `values` position by position.
    fn query_equals(
        &self,
        collection: &str,
        fields: &[String],
        values: &[Value],
    ) -> StorageResult<Vec<DocumentId>>;

    /// Ids of documents whose `field` equals `value` or, for list fields,
    /// contains it.
    fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<Vec<DocumentId>>;

    /// Token pointing at a document.
    fn token_of(&self, collection: &str, id: DocumentId) -> RefToken {
        RefToken::new(collection, id)
    }

    /// Declare an index. Backends without native index support ignore it.
    fn define_index(&self, collection: &str, index: IndexSpec) -> StorageResult<()> {
        let _ = (collection, index);
        Ok(())
    }

    /// Names of collections holding at least one document.
    fn collections(&self) -> StorageResult<Vec<String>>;

    /// Ids of every document in a collection.
    fn ids(&self, collection: &str) -> StorageResult<Vec<DocumentId>>;
}
