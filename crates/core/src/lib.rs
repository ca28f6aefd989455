//! Docgrid core types: the field value model, the classifier behind every grid
//! cell, and edit parsing.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod columns;
pub mod dates;
pub mod edit;
pub mod value;

pub use dates::DateEncoding;
pub use edit::{parse_edited, EditError};
pub use value::{classify, classify_field, kind_of, Classification, FieldValue, ValueKind};

/// Raw field value as delivered by the data-access boundary.
pub type RawValue = serde_json::Value;

/// Key-ordered field map of a document.
pub type Fields = serde_json::Map<String, RawValue>;

/// Rendered for null and missing fields alike.
pub const PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: id.into(), fields }
    }

    /// `None` means the field is absent, which is distinct from an explicit null.
    pub fn field(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    pub fn classify_field(&self, key: &str) -> Classification {
        classify_field(self.field(key))
    }
}

pub mod prelude {
    pub use super::{
        classify, classify_field, kind_of, parse_edited, Classification, DateEncoding, Document, EditError, FieldValue,
        Fields, ProjectedEntry, Projector, RawValue, ValueKind, PLACEHOLDER,
    };
}

/// Entry representing a projected cell: `(ColumnIndex, DisplayText)`
pub type ProjectedEntry = (u32, String);

/// Projector takes a document and yields rendered cells for the columns it knows.
/// Columns without a value in the document are left out.
pub trait Projector: Send + Sync {
    fn project(&self, doc: &Document) -> SmallVec<[ProjectedEntry; 8]>;
}
