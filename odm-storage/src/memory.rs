//! In-process backend.
//!
//! Keeps every collection in memory behind one `RwLock`. Unique indexes are
//! checked inside `store` while the write lock is held, so two racing saves
//! of the same unique tuple cannot both land. The whole state can be dumped
//! to and restored from a JSON snapshot.

use crate::backend::{Backend, Document, Fields, IndexSpec};
use crate::{StorageError, StorageResult};
use odm_types::{DocumentId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<DocumentId, Fields>>,
    #[serde(default)]
    indexes: BTreeMap<String, Vec<IndexSpec>>,
}

impl State {
    fn unique_collision(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        fields: &Fields,
    ) -> Option<&IndexSpec> {
        let docs = self.collections.get(collection)?;
        self.indexes.get(collection)?.iter().filter(|ix| ix.unique).find(|ix| {
            let tuple = ix.tuple_of(fields);
            docs.iter()
                .any(|(other, stored)| Some(*other) != id && ix.tuple_of(stored) == tuple)
        })
    }
}

/// Backend holding all documents in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a backend from a snapshot file, or an empty one if the file does
    /// not exist yet.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let backend = Self::new();
        if path.exists() {
            backend.load_snapshot(path)?;
        }
        Ok(backend)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }

    /// Total number of stored documents across collections.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.read()?.collections.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Indexes declared for a collection.
    pub fn indexes(&self, collection: &str) -> StorageResult<Vec<IndexSpec>> {
        Ok(self
            .read()?
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Serializes every document and index declaration to JSON.
    pub fn export_json(&self) -> StorageResult<String> {
        Ok(serde_json::to_string_pretty(&*self.read()?)?)
    }

    /// Replaces the whole state with a previously exported snapshot.
    pub fn import_json(&self, json: &str) -> StorageResult<()> {
        let state: State = serde_json::from_str(json)?;
        *self.write()? = state;
        Ok(())
    }

    /// Writes a snapshot file.
    ///
    /// The JSON goes to a temporary file in the same directory which then
    /// replaces `path`, so an interrupted write leaves the old snapshot intact.
    pub fn save_snapshot(&self, path: &Path) -> StorageResult<()> {
        let json = self.export_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        info!(path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// Loads a snapshot file, replacing the current state.
    pub fn load_snapshot(&self, path: &Path) -> StorageResult<()> {
        let json = std::fs::read_to_string(path)?;
        self.import_json(&json)?;
        info!(path = %path.display(), documents = self.len()?, "Snapshot loaded");
        Ok(())
    }
}

fn contains(stored: Option<&Value>, value: &Value) -> bool {
    match stored {
        Some(Value::List(items)) => items.contains(value),
        Some(other) => other == value,
        None => value.is_null(),
    }
}

impl Backend for MemoryBackend {
    fn get(&self, collection: &str, id: &DocumentId) -> StorageResult<Option<Document>> {
        let state = self.read()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: *id,
                collection: collection.to_string(),
                fields: fields.clone(),
            }))
    }

    fn store(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        fields: Fields,
    ) -> StorageResult<DocumentId> {
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StorageError::InvalidData(format!(
                "field '{name}' in collection '{collection}' holds a non-finite number"
            )));
        }

        let mut state = self.write()?;
        if let Some(index) = state.unique_collision(collection, id, &fields) {
            return Err(StorageError::UniqueViolation {
                collection: collection.to_string(),
                fields: index.fields.clone(),
            });
        }

        let id = id.unwrap_or_default();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, fields);
        debug!(collection, id = %id, "Document stored");
        Ok(id)
    }

    fn remove(&self, collection: &str, id: &DocumentId) -> StorageResult<bool> {
        let mut state = self.write()?;
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        let removed = docs.remove(id).is_some();
        if docs.is_empty() {
            state.collections.remove(collection);
        }
        if removed {
            debug!(collection, id = %id, "Document removed");
        }
        Ok(removed)
    }

    fn query_equals(
        &self,
        collection: &str,
        fields: &[String],
        values: &[Value],
    ) -> StorageResult<Vec<DocumentId>> {
        if fields.len() != values.len() {
            return Err(StorageError::InvalidData(format!(
                "{} fields queried with {} values",
                fields.len(),
                values.len()
            )));
        }

        let state = self.read()?;
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, stored)| {
                fields.iter().zip(values).all(|(name, value)| {
                    stored.get(name).map_or(value.is_null(), |v| v == value)
                })
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<Vec<DocumentId>> {
        let state = self.read()?;
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, stored)| contains(stored.get(field), value))
            .map(|(id, _)| *id)
            .collect())
    }

    fn define_index(&self, collection: &str, index: IndexSpec) -> StorageResult<()> {
        let mut state = self.write()?;
        let indexes = state.indexes.entry(collection.to_string()).or_default();
        if !indexes.contains(&index) {
            debug!(collection, fields = ?index.fields, unique = index.unique, "Index declared");
            indexes.push(index);
        }
        Ok(())
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        Ok(self.read()?.collections.keys().cloned().collect())
    }

    fn ids(&self, collection: &str) -> StorageResult<Vec<DocumentId>> {
        Ok(self
            .read()?
            .collections
            .get(collection)
            .map(|docs| docs.keys().copied().collect())
            .unwrap_or_default())
    }
}
