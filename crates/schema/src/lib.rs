//! Docgrid schema: infer which kinds each field path holds across a collection
//! sample, and derive the projected paths shown as grid columns.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use docgrid_core::{classify, kind_of, Document, Fields, ProjectedEntry, Projector, ValueKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

/// Nested maps deeper than this are not walked.
pub const MAX_DEPTH: usize = 3;
/// Upper bound on distinct paths tracked per collection.
pub const MAX_PATHS: usize = 16;
/// Upper bound on projected (column) paths.
pub const MAX_PROJECTED: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty field path")]
    Empty,
    #[error("wildcards and filters are not supported: {0}")]
    Unsupported(String),
    #[error("invalid path segment: {0:?}")]
    BadSegment(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathSpec {
    pub id: u32,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldStats {
    pub path: String,
    /// Documents where the path resolved, null included.
    pub present: u32,
    pub counts: BTreeMap<ValueKind, u32>,
    /// Most frequent non-null kind; `Null` only when nothing else was seen.
    pub dominant: ValueKind,
}

impl FieldStats {
    pub fn is_top_level(&self) -> bool {
        !self.path.contains(|c: char| c == '.' || c == '[')
    }

    /// More than one non-null kind observed.
    pub fn is_mixed(&self) -> bool {
        self.counts.keys().filter(|k| **k != ValueKind::Null).count() > 1
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub sampled: usize,
    pub fields: Vec<FieldStats>,
    pub projected_paths: Vec<PathSpec>,
}

impl CollectionSchema {
    pub fn field(&self, path: &str) -> Option<&FieldStats> {
        self.fields.iter().find(|f| f.path == path)
    }

    pub fn projector(&self) -> SchemaProjector {
        SchemaProjector::new(self.projected_paths.clone())
    }
}

/// Accept simple paths like `.address.city` or `tags[0]`.
pub fn normalize_field_path(p: &str) -> Result<String, PathError> {
    if p.contains('?') || p.contains('*') {
        return Err(PathError::Unsupported(p.to_string()));
    }
    let s = p.strip_prefix('.').unwrap_or(p);
    if s.is_empty() {
        return Err(PathError::Empty);
    }
    for seg in s.split('.') {
        if split_segment(seg).is_none() {
            return Err(PathError::BadSegment(seg.to_string()));
        }
    }
    Ok(s.to_string())
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Split `key[3]` into `("key", Some(3))`; a segment takes at most one trailing index.
fn split_segment(seg: &str) -> Option<(&str, Option<usize>)> {
    let (key, idx) = match seg.find('[') {
        Some(open) => {
            let inner = seg[open + 1..].strip_suffix(']')?;
            if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            (&seg[..open], Some(inner.parse().ok()?))
        }
        None => (seg, None),
    };
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    Some((key, idx))
}

/// Resolve a normalized path against a document's fields.
pub fn extract_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut cur: Option<&'a Value> = None;
    for seg in path.split('.') {
        let (key, idx) = split_segment(seg)?;
        let map = match cur {
            None => fields,
            Some(Value::Object(m)) => m,
            Some(_) => return None,
        };
        let mut next = map.get(key)?;
        if let Some(i) = idx {
            next = next.as_array()?.get(i)?;
        }
        cur = Some(next);
    }
    cur
}

#[derive(Default)]
struct Accumulator {
    order: Vec<String>,
    counts: FxHashMap<String, FxHashMap<ValueKind, u32>>,
}

impl Accumulator {
    fn record(&mut self, path: &str, kind: ValueKind) {
        if !self.counts.contains_key(path) {
            if self.order.len() >= MAX_PATHS {
                return;
            }
            self.order.push(path.to_string());
        }
        *self.counts.entry(path.to_string()).or_default().entry(kind).or_insert(0) += 1;
    }

    fn finish(self) -> Vec<FieldStats> {
        let Accumulator { order, mut counts } = self;
        order
            .into_iter()
            .map(|path| {
                let counts: BTreeMap<ValueKind, u32> = counts.remove(&path).unwrap_or_default().into_iter().collect();
                let present = counts.values().sum();
                let dominant = dominant_kind(&counts);
                FieldStats { path, present, counts, dominant }
            })
            .collect()
    }
}

fn dominant_kind(counts: &BTreeMap<ValueKind, u32>) -> ValueKind {
    let mut best: Option<(ValueKind, u32)> = None;
    for (k, c) in counts.iter().filter(|(k, _)| **k != ValueKind::Null) {
        if best.map(|(_, bc)| *c > bc).unwrap_or(true) {
            best = Some((*k, *c));
        }
    }
    best.map(|(k, _)| k).unwrap_or(ValueKind::Null)
}

fn walk_fields(fields: &Fields, base: &str, depth: usize, acc: &mut Accumulator) {
    for (k, v) in fields.iter() {
        // keys the path grammar cannot address are skipped
        if k.is_empty() || !k.chars().all(is_key_char) {
            continue;
        }
        let path = if base.is_empty() { k.clone() } else { format!("{}.{}", base, k) };
        let kind = kind_of(v);
        acc.record(&path, kind);
        if depth + 1 >= MAX_DEPTH {
            continue;
        }
        match (kind, v) {
            (ValueKind::Map, Value::Object(obj)) => walk_fields(obj, &path, depth + 1, acc),
            (ValueKind::Array, Value::Array(items)) => {
                if let Some(Value::Object(first)) = items.first() {
                    if kind_of(&items[0]) == ValueKind::Map {
                        walk_fields(first, &format!("{}[0]", path), depth + 1, acc);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Infer a schema from sampled documents.
pub fn infer_schema(docs: &[Document]) -> CollectionSchema {
    let mut acc = Accumulator::default();
    for doc in docs {
        walk_fields(&doc.fields, "", 0, &mut acc);
    }
    let fields = acc.finish();
    let projected_paths = pick_projected(&fields);
    debug!(sampled = docs.len(), paths = fields.len(), projected = projected_paths.len(), "schema inferred");
    CollectionSchema { sampled: docs.len(), fields, projected_paths }
}

/// Top-level non-structured fields first, then nested ones, in first-seen order.
fn pick_projected(fields: &[FieldStats]) -> Vec<PathSpec> {
    let inline = |f: &&FieldStats| !f.dominant.is_structured();
    fields
        .iter()
        .filter(inline)
        .filter(|f| f.is_top_level())
        .chain(fields.iter().filter(inline).filter(|f| !f.is_top_level()))
        .take(MAX_PROJECTED)
        .enumerate()
        .map(|(i, f)| PathSpec { id: i as u32, path: f.path.clone() })
        .collect()
}

/// Projector over a fixed set of (possibly nested) paths.
#[derive(Clone, Debug)]
pub struct SchemaProjector {
    specs: Vec<PathSpec>,
}

impl SchemaProjector {
    pub fn new(specs: Vec<PathSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[PathSpec] {
        &self.specs
    }
}

impl Projector for SchemaProjector {
    fn project(&self, doc: &Document) -> SmallVec<[ProjectedEntry; 8]> {
        let mut out: SmallVec<[ProjectedEntry; 8]> = SmallVec::new();
        for spec in self.specs.iter() {
            if let Some(v) = extract_path(&doc.fields, &spec.path) {
                out.push((spec.id, classify(v).display_text));
                if out.len() >= 8 {
                    break;
                }
            }
        }
        out
    }
}
