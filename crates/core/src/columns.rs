//! Grid columns and the default document projector.
//!
//! This module provides:
//! - Column specs (labels, widths, kinds) derived from the documents on screen
//! - A projector that renders top-level fields through the classifier
//! - Row rendering that fills the id column and placeholders for missing fields

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::classify;
use crate::{Document, ProjectedEntry, Projector, PLACEHOLDER};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Id,
    Field(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub kind: ColumnKind,
    pub label: String,
    pub width: f32,
}

pub const MIN_WIDTH: f32 = 60.0;
pub const MAX_WIDTH: f32 = 320.0;
const CHAR_WIDTH: f32 = 7.0;
const PADDING: f32 = 16.0;

/// Width for the widest line among `label` and `cells`, clamped to the grid bounds.
pub fn column_width<'a>(label: &str, cells: impl IntoIterator<Item = &'a str>) -> f32 {
    let widest = cells
        .into_iter()
        .flat_map(|c| c.lines())
        .map(|l| l.chars().count())
        .chain(std::iter::once(label.chars().count()))
        .max()
        .unwrap_or(0);
    (widest as f32 * CHAR_WIDTH + PADDING).clamp(MIN_WIDTH, MAX_WIDTH)
}

fn col(kind: ColumnKind, label: impl Into<String>, width: f32) -> ColumnSpec {
    ColumnSpec { kind, label: label.into(), width }
}

/// Top-level field keys in first-seen order across `docs`.
pub fn field_keys(docs: &[Document]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for doc in docs {
        for k in doc.fields.keys() {
            if !keys.iter().any(|x| x == k) {
                keys.push(k.clone());
            }
        }
    }
    keys
}

/// Full column set: the id column, then one column per top-level field.
pub fn derive_columns(docs: &[Document]) -> Vec<ColumnSpec> {
    let mut cols: Vec<ColumnSpec> = Vec::new();
    cols.push(col(ColumnKind::Id, "id", column_width("id", docs.iter().map(|d| d.id.as_str()))));

    let keys = field_keys(docs);
    let projector = DocumentProjector::new(keys.clone());
    let projected: Vec<_> = docs.iter().map(|d| projector.project(d)).collect();
    for (i, key) in keys.into_iter().enumerate() {
        let cells = projected
            .iter()
            .flat_map(|row| row.iter())
            .filter(|(idx, _)| *idx as usize == i)
            .map(|(_, text)| text.as_str());
        let width = column_width(&key, cells);
        cols.push(col(ColumnKind::Field(key.clone()), key, width));
    }
    cols
}

/// Render one grid row for `columns`; missing fields show the placeholder.
pub fn render_row(doc: &Document, columns: &[ColumnSpec]) -> Vec<String> {
    columns
        .iter()
        .map(|c| match &c.kind {
            ColumnKind::Id => doc.id.clone(),
            ColumnKind::Field(key) => doc.field(key).map(|v| classify(v).display_text).unwrap_or_else(|| PLACEHOLDER.to_string()),
        })
        .collect()
}

/// Projects top-level fields by name; entry ids are positions in `keys`.
#[derive(Clone, Debug, Default)]
pub struct DocumentProjector {
    keys: Vec<String>,
}

impl DocumentProjector {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Projector for DocumentProjector {
    fn project(&self, doc: &Document) -> SmallVec<[ProjectedEntry; 8]> {
        let mut out = SmallVec::new();
        for (i, key) in self.keys.iter().enumerate() {
            if let Some(v) = doc.field(key) {
                out.push((i as u32, classify(v).display_text));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: serde_json::Value) -> Document {
        match v {
            serde_json::Value::Object(fields) => Document::new(id, fields),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn width_is_clamped() {
        assert_eq!(column_width("a", ["b"]), MIN_WIDTH);
        assert_eq!(column_width("a", ["x".repeat(200).as_str()]), MAX_WIDTH);
        assert_eq!(column_width("name", ["0123456789"]), 10.0 * 7.0 + 16.0);
        // widest line, not total length
        assert_eq!(column_width("n", ["0123456789\nab"]), 10.0 * 7.0 + 16.0);
    }

    #[test]
    fn projector_skips_missing_fields() {
        let d = doc("d1", json!({"a": 1, "c": null}));
        let pj = DocumentProjector::new(vec!["a".into(), "b".into(), "c".into()]);
        let out = pj.project(&d);
        assert_eq!(out.as_slice(), &[(0, "1".to_string()), (2, PLACEHOLDER.to_string())]);
    }

    #[test]
    fn row_fills_placeholders() {
        let d = doc("d1", json!({"a": true}));
        let cols = vec![
            col(ColumnKind::Id, "id", 60.0),
            col(ColumnKind::Field("a".into()), "a", 60.0),
            col(ColumnKind::Field("b".into()), "b", 60.0),
        ];
        assert_eq!(render_row(&d, &cols), vec!["d1", "true", PLACEHOLDER]);
    }
}
