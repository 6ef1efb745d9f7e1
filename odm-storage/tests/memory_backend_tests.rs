use chrono::{TimeZone, Utc};
use odm_storage::{Backend, Fields, IndexSpec, MemoryBackend, StorageError};
use odm_types::{DocumentId, RefToken, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

// ── Error type coverage ─────────────────────────────────────────

#[test]
fn error_display() {
    let err = StorageError::UniqueViolation {
        collection: "user".to_string(),
        fields: vec!["login".to_string(), "realm".to_string()],
    };
    let text = format!("{err}");
    assert!(text.contains("user"));
    assert!(text.contains("login, realm"));

    let err = StorageError::NotFound("user:x".to_string());
    assert!(format!("{err}").contains("user:x"));
}

// ── get / store / remove ────────────────────────────────────────

#[test]
fn store_assigns_id_and_get_returns_document() {
    let backend = MemoryBackend::new();
    let id = backend
        .store("user", None, fields(&[("login", Value::from("a"))]))
        .unwrap();

    let doc = backend.get("user", &id).unwrap().unwrap();
    assert_eq!(doc.id, id);
    assert_eq!(doc.collection, "user");
    assert_eq!(doc.get("login"), Some(&Value::from("a")));
}

#[test]
fn store_with_id_replaces_document() {
    let backend = MemoryBackend::new();
    let id = backend
        .store("user", None, fields(&[("login", Value::from("a"))]))
        .unwrap();
    let same = backend
        .store("user", Some(id), fields(&[("login", Value::from("b"))]))
        .unwrap();

    assert_eq!(id, same);
    assert_eq!(backend.len().unwrap(), 1);
    let doc = backend.get("user", &id).unwrap().unwrap();
    assert_eq!(doc.get("login"), Some(&Value::from("b")));
}

#[test]
fn get_missing_is_none() {
    let backend = MemoryBackend::new();
    assert!(backend.get("user", &DocumentId::new()).unwrap().is_none());
}

#[test]
fn remove_reports_whether_anything_was_removed() {
    let backend = MemoryBackend::new();
    let id = backend.store("user", None, Fields::new()).unwrap();

    assert!(backend.remove("user", &id).unwrap());
    assert!(!backend.remove("user", &id).unwrap());
    assert!(backend.get("user", &id).unwrap().is_none());
    assert!(backend.collections().unwrap().is_empty());
}

#[test]
fn resolve_follows_token() {
    let backend = MemoryBackend::new();
    let id = backend.store("image", None, Fields::new()).unwrap();
    let token = backend.token_of("image", id);

    assert_eq!(token, RefToken::new("image", id));
    assert_eq!(backend.resolve(&token).unwrap().unwrap().id, id);

    backend.remove("image", &id).unwrap();
    assert!(backend.resolve(&token).unwrap().is_none());
}

#[test]
fn collections_and_ids() {
    let backend = MemoryBackend::new();
    let a = backend.store("a", None, Fields::new()).unwrap();
    let b = backend.store("a", None, Fields::new()).unwrap();
    backend.store("b", None, Fields::new()).unwrap();

    assert_eq!(backend.collections().unwrap(), vec!["a", "b"]);
    assert_eq!(backend.ids("a").unwrap(), vec![a, b]);
    assert!(backend.ids("c").unwrap().is_empty());
}

// ── Queries ─────────────────────────────────────────────────────

#[test]
fn query_equals_matches_tuples() {
    let backend = MemoryBackend::new();
    let en = backend
        .store(
            "term",
            None,
            fields(&[("alias", Value::from("x")), ("language", Value::from("en"))]),
        )
        .unwrap();
    backend
        .store(
            "term",
            None,
            fields(&[("alias", Value::from("x")), ("language", Value::from("ru"))]),
        )
        .unwrap();

    let hits = backend
        .query_equals(
            "term",
            &["alias".to_string(), "language".to_string()],
            &[Value::from("x"), Value::from("en")],
        )
        .unwrap();
    assert_eq!(hits, vec![en]);
}

#[test]
fn query_equals_treats_missing_field_as_null() {
    let backend = MemoryBackend::new();
    let id = backend.store("term", None, Fields::new()).unwrap();
    let hits = backend
        .query_equals("term", &["alias".to_string()], &[Value::Null])
        .unwrap();
    assert_eq!(hits, vec![id]);
}

#[test]
fn query_equals_rejects_arity_mismatch() {
    let backend = MemoryBackend::new();
    let err = backend
        .query_equals("term", &["alias".to_string()], &[])
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
}

#[test]
fn query_contains_checks_list_membership() {
    let backend = MemoryBackend::new();
    let tag = RefToken::new("tag", DocumentId::new());
    let with = backend
        .store(
            "article",
            None,
            fields(&[("tags", Value::List(vec![Value::Ref(tag.clone())]))]),
        )
        .unwrap();
    backend
        .store("article", None, fields(&[("tags", Value::List(vec![]))]))
        .unwrap();

    let hits = backend
        .query_contains("article", "tags", &Value::Ref(tag))
        .unwrap();
    assert_eq!(hits, vec![with]);
}

// ── Native unique indexes ───────────────────────────────────────

#[test]
fn unique_index_rejects_duplicate_tuple() {
    let backend = MemoryBackend::new();
    backend
        .define_index("user", IndexSpec::unique(["login"]))
        .unwrap();
    backend
        .store("user", None, fields(&[("login", Value::from("a"))]))
        .unwrap();

    let err = backend
        .store("user", None, fields(&[("login", Value::from("a"))]))
        .unwrap_err();
    assert!(matches!(err, StorageError::UniqueViolation { ref fields, .. } if fields == &["login"]));
    assert_eq!(backend.len().unwrap(), 1);
}

#[test]
fn unique_index_allows_resaving_same_document() {
    let backend = MemoryBackend::new();
    backend
        .define_index("user", IndexSpec::unique(["login"]))
        .unwrap();
    let id = backend
        .store("user", None, fields(&[("login", Value::from("a"))]))
        .unwrap();
    assert!(backend
        .store("user", Some(id), fields(&[("login", Value::from("a"))]))
        .is_ok());
}

#[test]
fn non_unique_index_allows_duplicates() {
    let backend = MemoryBackend::new();
    backend
        .define_index("term", IndexSpec::new(vec!["weight".into()], false))
        .unwrap();
    backend
        .store("term", None, fields(&[("weight", Value::Int(1))]))
        .unwrap();
    assert!(backend
        .store("term", None, fields(&[("weight", Value::Int(1))]))
        .is_ok());
}

#[test]
fn define_index_is_idempotent() {
    let backend = MemoryBackend::new();
    backend.define_index("user", IndexSpec::unique(["login"])).unwrap();
    backend.define_index("user", IndexSpec::unique(["login"])).unwrap();
    assert_eq!(backend.indexes("user").unwrap().len(), 1);
}

#[test]
fn concurrent_stores_of_same_unique_tuple_admit_one() {
    let backend = Arc::new(MemoryBackend::new());
    backend.define_index("user", IndexSpec::unique(["login"])).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                backend
                    .store("user", None, fields(&[("login", Value::from("same"))]))
                    .is_ok()
            })
        })
        .collect();

    let stored = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(stored, 1);
    assert_eq!(backend.len().unwrap(), 1);
}

// ── Snapshots ───────────────────────────────────────────────────

#[test]
fn snapshot_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odm.json");

    let backend = MemoryBackend::new();
    backend.define_index("user", IndexSpec::unique(["login"])).unwrap();
    let picture = RefToken::new("image", DocumentId::new());
    let born = Utc.with_ymd_and_hms(1990, 5, 17, 8, 0, 0).unwrap();
    let id = backend
        .store(
            "user",
            None,
            fields(&[
                ("login", Value::from("a")),
                ("birth_date", Value::DateTime(born)),
                ("picture", Value::Ref(picture.clone())),
            ]),
        )
        .unwrap();
    backend.save_snapshot(&path).unwrap();

    let restored = MemoryBackend::open(&path).unwrap();
    let doc = restored.get("user", &id).unwrap().unwrap();
    assert_eq!(doc.get("birth_date"), Some(&Value::DateTime(born)));
    assert_eq!(doc.get("picture"), Some(&Value::Ref(picture)));
    assert_eq!(restored.indexes("user").unwrap().len(), 1);
}

#[test]
fn snapshot_keeps_float_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odm.json");

    let backend = MemoryBackend::new();
    let id = backend
        .store(
            "item",
            None,
            fields(&[
                ("score", Value::Float(-0.125)),
                ("history", Value::List(vec![Value::Float(1e300), Value::Int(2)])),
            ]),
        )
        .unwrap();
    backend.save_snapshot(&path).unwrap();

    let restored = MemoryBackend::open(&path).unwrap();
    let doc = restored.get("item", &id).unwrap().unwrap();
    assert_eq!(doc.get("score"), Some(&Value::Float(-0.125)));
    assert_eq!(
        doc.get("history"),
        Some(&Value::List(vec![Value::Float(1e300), Value::Int(2)]))
    );
}

#[test]
fn store_rejects_non_finite_floats() {
    let backend = MemoryBackend::new();
    let err = backend
        .store("item", None, fields(&[("score", Value::Float(f64::INFINITY))]))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(ref msg) if msg.contains("score")));

    let nested = Value::List(vec![Value::Float(f64::NAN)]);
    assert!(backend.store("item", None, fields(&[("history", nested)])).is_err());
    assert!(backend.is_empty().unwrap());

    let json = backend.export_json().unwrap();
    MemoryBackend::new().import_json(&json).unwrap();
}

#[test]
fn save_snapshot_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odm.json");
    std::fs::write(&path, "stale").unwrap();

    let backend = MemoryBackend::new();
    backend.store("tag", None, fields(&[("title", Value::from("rust"))])).unwrap();
    backend.save_snapshot(&path).unwrap();

    let restored = MemoryBackend::open(&path).unwrap();
    assert_eq!(restored.len().unwrap(), 1);
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn open_missing_snapshot_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::open(&dir.path().join("absent.json")).unwrap();
    assert!(backend.is_empty().unwrap());
}

#[test]
fn import_rejects_malformed_json() {
    let backend = MemoryBackend::new();
    let err = backend.import_json("{not json").unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}
