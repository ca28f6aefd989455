//! Docgrid persistence: the document CRUD boundary and a small SQLite store
//! behind it. Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use docgrid_core::{Document, FieldValue, Fields};
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },
    #[error("stored body of {collection}/{id} is not a JSON object")]
    Corrupt { collection: String, id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub documents: u64,
}

/// Document CRUD as seen by the grid. Values arrive already parsed.
pub trait DocumentStore {
    fn collections(&self) -> Result<Vec<CollectionInfo>>;
    fn list(&self, collection: &str, limit: Option<usize>) -> Result<Vec<Document>>;
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;
    /// Insert a new document; a random id is generated when `id` is `None`.
    fn create(&self, collection: &str, id: Option<&str>, fields: Fields) -> Result<String>;
    /// Insert or replace.
    fn put(&self, collection: &str, doc: &Document) -> Result<()>;
    /// Replace the fields of an existing document.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;
    /// Write one top-level field of an existing document and return the result.
    fn set_field(&self, collection: &str, id: &str, key: &str, value: &FieldValue) -> Result<Document>;
    /// Returns whether a document was removed.
    fn delete(&self, collection: &str, id: &str) -> Result<bool>;
}

/// SQLite-backed store. Simple, synchronous.
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("DOCGRID_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        let me = Self::init(db)?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        info!(path = %path, "document store opened");
        Ok(me)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = rusqlite::Connection::open_in_memory().context("opening in-memory sqlite db")?;
        Self::init(db)
    }

    fn init(db: rusqlite::Connection) -> Result<Self> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL,
                updated_ts INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )
        .context("creating documents table")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("document store connection poisoned"))
    }
}

fn decode(collection: &str, id: String, body: &str) -> Result<Document> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => Ok(Document { id, fields }),
        _ => Err(StoreError::Corrupt { collection: collection.to_string(), id }.into()),
    }
}

fn encode(fields: &Fields) -> Result<String> {
    serde_json::to_string(fields).context("serializing document body")
}

fn not_found(collection: &str, id: &str) -> anyhow::Error {
    StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }.into()
}

impl DocumentStore for SqliteStore {
    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            out.push(CollectionInfo { name, documents: count.max(0) as u64 });
        }
        Ok(out)
    }

    fn list(&self, collection: &str, limit: Option<usize>) -> Result<Vec<Document>> {
        let started = std::time::Instant::now();
        let cap = limit.map(|n| n as i64).unwrap_or(-1);
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id LIMIT ?2")?;
        let mut rows = stmt.query((collection, cap))?;
        let mut out: Vec<Document> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let body: String = row.get(1)?;
            out.push(decode(collection, id, &body)?);
        }
        histogram!("persist_list_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(collection, count = out.len(), "listed documents");
        Ok(out)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let db = self.conn()?;
        let body: Option<String> = db
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                (collection, id),
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| decode(collection, id.to_string(), &b)).transpose()
    }

    fn create(&self, collection: &str, id: Option<&str>, fields: Fields) -> Result<String> {
        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let body = encode(&fields)?;
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2", (collection, &id), |row| row.get(0))
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists { collection: collection.to_string(), id }.into());
        }
        tx.execute(
            "INSERT INTO documents(collection, id, body, updated_ts) VALUES (?1, ?2, ?3, ?4)",
            (collection, &id, &body, now_ms()),
        )?;
        tx.commit()?;
        counter!("persist_create_total", 1u64);
        debug!(collection, id = %id, "document created");
        Ok(id)
    }

    fn put(&self, collection: &str, doc: &Document) -> Result<()> {
        let body = encode(&doc.fields)?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO documents(collection, id, body, updated_ts) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_ts = excluded.updated_ts",
            (collection, &doc.id, &body, now_ms()),
        )?;
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let started = std::time::Instant::now();
        let body = encode(&fields)?;
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE documents SET body = ?3, updated_ts = ?4 WHERE collection = ?1 AND id = ?2",
            (collection, id, &body, now_ms()),
        )?;
        if n == 0 {
            return Err(not_found(collection, id));
        }
        histogram!("persist_update_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_update_total", 1u64);
        Ok(())
    }

    fn set_field(&self, collection: &str, id: &str, key: &str, value: &FieldValue) -> Result<Document> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                (collection, id),
                |row| row.get(0),
            )
            .optional()?;
        let mut doc = match body {
            Some(b) => decode(collection, id.to_string(), &b)?,
            None => return Err(not_found(collection, id)),
        };
        doc.fields.insert(key.to_string(), value.to_raw());
        tx.execute(
            "UPDATE documents SET body = ?3, updated_ts = ?4 WHERE collection = ?1 AND id = ?2",
            (collection, id, encode(&doc.fields)?, now_ms()),
        )?;
        tx.commit()?;
        counter!("persist_set_field_total", 1u64);
        debug!(collection, id, key, kind = %value.kind(), "field written");
        Ok(doc)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM documents WHERE collection = ?1 AND id = ?2", (collection, id))?;
        if n > 0 {
            counter!("persist_delete_total", 1u64);
        }
        Ok(n > 0)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".docgrid");
        let _ = std::fs::create_dir_all(&p);
        p.push("docgrid.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "docgrid.db".to_string()
}

pub fn now_ms() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn create_get_delete() {
        let s = SqliteStore::open_in_memory().unwrap();
        let id = s.create("users", Some("ada"), fields(json!({"age": 36}))).unwrap();
        assert_eq!(id, "ada");
        let doc = s.get("users", "ada").unwrap().unwrap();
        assert_eq!(doc.field("age"), Some(&json!(36)));
        assert!(s.get("users", "nobody").unwrap().is_none());
        assert!(s.delete("users", "ada").unwrap());
        assert!(!s.delete("users", "ada").unwrap());
    }

    #[test]
    fn create_rejects_duplicates_and_generates_ids() {
        let s = SqliteStore::open_in_memory().unwrap();
        s.create("c", Some("x"), Fields::new()).unwrap();
        let err = s.create("c", Some("x"), Fields::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::AlreadyExists { .. })));
        let generated = s.create("c", None, Fields::new()).unwrap();
        assert_eq!(generated.len(), 36);
    }
}
