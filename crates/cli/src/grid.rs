//! Plain-text grid rendering for the terminal.

#![forbid(unsafe_code)]

use docgrid_core::columns::{column_width, derive_columns, render_row, ColumnSpec, MIN_WIDTH};
use docgrid_core::{Document, Projector, PLACEHOLDER};
use docgrid_schema::CollectionSchema;
use serde::Serialize;

const CHAR_WIDTH: f32 = 7.0;
const PADDING: f32 = 16.0;

#[derive(Debug, Clone, Serialize)]
pub struct Grid {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridColumn {
    pub label: String,
    pub width: f32,
}

impl From<&ColumnSpec> for GridColumn {
    fn from(c: &ColumnSpec) -> Self {
        Self { label: c.label.clone(), width: c.width }
    }
}

/// Grid with one column per top-level field.
pub fn field_grid(docs: &[Document]) -> Grid {
    let specs = derive_columns(docs);
    let rows = docs.iter().map(|d| render_row(d, &specs)).collect();
    Grid { columns: specs.iter().map(GridColumn::from).collect(), rows }
}

/// Grid over the schema's projected paths, nested ones included.
pub fn schema_grid(docs: &[Document], schema: &CollectionSchema) -> Grid {
    let projector = schema.projector();
    let paths = &schema.projected_paths;
    let rows: Vec<Vec<String>> = docs
        .iter()
        .map(|d| {
            let mut row = vec![PLACEHOLDER.to_string(); paths.len() + 1];
            row[0] = d.id.clone();
            for (id, text) in projector.project(d) {
                if let Some(pos) = paths.iter().position(|p| p.id == id) {
                    row[pos + 1] = text;
                }
            }
            row
        })
        .collect();

    let mut columns = vec![GridColumn { label: "id".into(), width: column_width("id", rows.iter().map(|r| r[0].as_str())) }];
    for (i, p) in paths.iter().enumerate() {
        let width = column_width(&p.path, rows.iter().map(|r| r[i + 1].as_str()));
        columns.push(GridColumn { label: p.path.clone(), width });
    }
    Grid { columns, rows }
}

fn chars_for(width: f32) -> usize {
    (((width.max(MIN_WIDTH)) - PADDING) / CHAR_WIDTH).floor().max(1.0) as usize
}

/// Fit a cell into `max` characters: first line only, ellipsis when cut.
pub fn fit(text: &str, max: usize) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");
    let more_lines = lines.next().is_some();
    let count = first.chars().count();
    if count <= max && !more_lines {
        return first.to_string();
    }
    let keep = if count < max { count } else { max.saturating_sub(1) };
    let mut out: String = first.chars().take(keep).collect();
    out.push('…');
    out
}

pub fn render_text(grid: &Grid) -> String {
    let widths: Vec<usize> = grid.columns.iter().map(|c| chars_for(c.width)).collect();
    let mut out = String::new();
    let header: Vec<String> = grid
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<width$}", fit(&c.label.to_uppercase(), *w), width = *w))
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');
    for row in &grid.rows {
        let cells: Vec<String> =
            row.iter().zip(&widths).map(|(cell, w)| format!("{:<width$}", fit(cell, *w), width = *w)).collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}
