//! Operator commands over a stored document set.
//!
//! Everything here works at the backend level: no model definitions are
//! needed, so the console can inspect and repair any snapshot.

use anyhow::{Context, Result, bail};
use odm_storage::{Backend, Document, StorageResult};
use odm_types::{RefToken, Value};
use serde_json::json;
use tracing::{debug, info};

/// Document count of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub documents: usize,
}

pub fn list_collections(backend: &dyn Backend) -> StorageResult<Vec<CollectionInfo>> {
    backend
        .collections()?
        .into_iter()
        .map(|name| {
            let documents = backend.ids(&name)?.len();
            Ok(CollectionInfo { name, documents })
        })
        .collect()
}

/// Parses a command-line value.
///
/// Integers, floats and booleans become typed values, `collection:id`
/// becomes a reference, anything else stays a string.
#[must_use]
pub fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    raw.parse::<RefToken>()
        .map_or_else(|_| Value::from(raw), Value::Ref)
}

/// JSON rendering of a document with its id and collection.
#[must_use]
pub fn document_json(doc: &Document) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = doc
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    json!({
        "_id": doc.id.to_string(),
        "_model": doc.collection,
        "fields": fields,
    })
}

pub fn show_document(backend: &dyn Backend, token: &RefToken) -> Result<Document> {
    match backend.resolve(token)? {
        Some(doc) => Ok(doc),
        None => bail!("document {token} not found"),
    }
}

/// Documents of `collection` whose `field` equals or contains `value`.
pub fn find_documents(
    backend: &dyn Backend,
    collection: &str,
    field: &str,
    value: &Value,
) -> StorageResult<Vec<Document>> {
    let mut out = Vec::new();
    for id in backend.query_contains(collection, field, value)? {
        if let Some(doc) = backend.get(collection, &id)? {
            out.push(doc);
        }
    }
    Ok(out)
}

pub fn remove_document(backend: &dyn Backend, token: &RefToken) -> Result<()> {
    let removed = backend
        .remove(token.collection(), &token.id())
        .with_context(|| format!("failed to remove {token}"))?;
    if !removed {
        bail!("document {token} not found");
    }
    info!(token = %token, "Document removed");
    Ok(())
}

/// Outcome of a dangling-reference sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub documents_scanned: usize,
    pub documents_updated: usize,
    pub references_dropped: usize,
}

fn exists(backend: &dyn Backend, token: &RefToken) -> StorageResult<bool> {
    Ok(backend.resolve(token)?.is_some())
}

/// Clears single references and drops list elements whose target is gone.
/// Returns the number of references removed from `value`.
fn prune(backend: &dyn Backend, value: &mut Value) -> StorageResult<usize> {
    match value {
        Value::Ref(token) => {
            if exists(backend, token)? {
                Ok(0)
            } else {
                debug!(token = %token, "Dropping dangling reference");
                *value = Value::Null;
                Ok(1)
            }
        }
        Value::List(items) => {
            let before = items.len();
            let mut kept = Vec::with_capacity(before);
            for item in items.drain(..) {
                if let Value::Ref(token) = &item {
                    if !exists(backend, token)? {
                        debug!(token = %token, "Dropping dangling list element");
                        continue;
                    }
                }
                kept.push(item);
            }
            *items = kept;
            Ok(before - items.len())
        }
        _ => Ok(0),
    }
}

/// Walks every document and removes references to documents that no longer
/// exist. Only documents that changed are written back.
pub fn drop_dangling_refs(backend: &dyn Backend, dry_run: bool) -> StorageResult<SweepReport> {
    let mut report = SweepReport::default();
    for collection in backend.collections()? {
        for id in backend.ids(&collection)? {
            let Some(mut doc) = backend.get(&collection, &id)? else {
                continue;
            };
            report.documents_scanned += 1;

            let mut dropped = 0;
            for value in doc.fields.values_mut() {
                dropped += prune(backend, value)?;
            }
            if dropped == 0 {
                continue;
            }

            report.documents_updated += 1;
            report.references_dropped += dropped;
            if !dry_run {
                backend.store(&collection, Some(id), doc.fields)?;
            }
        }
    }
    info!(
        scanned = report.documents_scanned,
        updated = report.documents_updated,
        dropped = report.references_dropped,
        dry_run,
        "Dangling reference sweep finished"
    );
    Ok(report)
}

/// Parses a `collection:id` argument.
pub fn parse_token(raw: &str) -> Result<RefToken> {
    raw.parse::<RefToken>()
        .with_context(|| format!("'{raw}' is not a collection:id reference"))
}

