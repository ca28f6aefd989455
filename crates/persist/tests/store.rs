#![forbid(unsafe_code)]

use docgrid_core::{parse_edited, DateEncoding, Document, Fields, ValueKind};
use docgrid_persist::{DocumentStore, SqliteStore, StoreError};
use serde_json::json;

fn temp_db() -> String {
    let dir = std::env::temp_dir();
    let f = format!(
        "docgrid-test-{}.db",
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
    );
    dir.join(f).to_string_lossy().to_string()
}

fn fields(v: serde_json::Value) -> Fields {
    match v {
        serde_json::Value::Object(m) => m,
        _ => panic!("fixture must be an object"),
    }
}

#[test]
fn list_is_ordered_by_id_and_limited() {
    let s = SqliteStore::open(&temp_db()).unwrap();
    for id in ["c", "a", "b"] {
        s.put("letters", &Document::new(id, fields(json!({"v": id})))).unwrap();
    }
    s.put("other", &Document::new("z", Fields::new())).unwrap();

    let all = s.list("letters", None).unwrap();
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(s.list("letters", Some(2)).unwrap().len(), 2);

    let cols = s.collections().unwrap();
    assert_eq!(cols.len(), 2);
    assert_eq!(cols[0].name, "letters");
    assert_eq!(cols[0].documents, 3);
}

#[test]
fn put_replaces_and_update_requires_existing() {
    let s = SqliteStore::open(&temp_db()).unwrap();
    s.put("c", &Document::new("d", fields(json!({"a": 1})))).unwrap();
    s.put("c", &Document::new("d", fields(json!({"b": 2})))).unwrap();
    let d = s.get("c", "d").unwrap().unwrap();
    assert_eq!(d.field("a"), None);
    assert_eq!(d.field("b"), Some(&json!(2)));

    s.update("c", "d", fields(json!({"b": 3}))).unwrap();
    assert_eq!(s.get("c", "d").unwrap().unwrap().field("b"), Some(&json!(3)));

    let err = s.update("c", "missing", Fields::new()).unwrap_err();
    assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound { .. })));
}

#[test]
fn committing_edits_through_set_field() {
    let s = SqliteStore::open(&temp_db()).unwrap();
    s.put("users", &Document::new("ada", fields(json!({
        "tags": ["a"],
        "createdAt": {"seconds": 1}
    })))).unwrap();

    let current = s.get("users", "ada").unwrap().unwrap();
    let c = current.classify_field("tags");
    assert_eq!(c.kind, ValueKind::Array);
    let edited = parse_edited(c.kind, "[\"a\", \"b\"]").unwrap();
    let doc = s.set_field("users", "ada", "tags", &edited).unwrap();
    assert_eq!(doc.field("tags"), Some(&json!(["a", "b"])));

    let c = current.classify_field("createdAt");
    let edited = parse_edited(c.kind, "2023-11-14T22:13:20.000Z").unwrap();
    assert_eq!(edited.date_encoding(), Some(DateEncoding::IsoString));
    s.set_field("users", "ada", "createdAt", &edited).unwrap();

    // a field that was missing is added
    let added = parse_edited(ValueKind::Null, "42").unwrap();
    s.set_field("users", "ada", "score", &added).unwrap();

    let stored = s.get("users", "ada").unwrap().unwrap();
    assert_eq!(stored.field("createdAt"), Some(&json!("2023-11-14T22:13:20.000Z")));
    assert_eq!(stored.field("score"), Some(&json!(42)));

    let err = s.set_field("users", "nobody", "x", &added).unwrap_err();
    assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound { .. })));
}

#[test]
fn reopening_keeps_documents() {
    let path = temp_db();
    {
        let s = SqliteStore::open(&path).unwrap();
        s.create("c", Some("keep"), fields(json!({"n": null}))).unwrap();
    }
    let s = SqliteStore::open(&path).unwrap();
    let d = s.get("c", "keep").unwrap().unwrap();
    // explicit null survives; it is not the same as a missing field
    assert_eq!(d.field("n"), Some(&serde_json::Value::Null));
    assert_eq!(d.field("m"), None);
}
