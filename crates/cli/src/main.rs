use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use docgrid_core::dates;
use docgrid_core::prelude::*;
use docgrid_persist::{DocumentStore, SqliteStore};
use serde_json::Value;
use tracing::{info, warn};

mod grid;

#[derive(Parser, Debug)]
#[command(name = "docgridctl", version, about = "Docgrid CLI: browse and edit document collections as a grid")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite database path (default: ~/.docgrid/docgrid.db)
    #[arg(long = "db", global = true, env = "DOCGRID_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a JSON value (text that is not JSON is taken as a string)
    Classify {
        value: String,
    },
    /// Parse edited cell text as a value of the given kind
    Parse {
        /// null, boolean, number, string, date, array, map
        #[arg(long = "kind")]
        kind: ValueKind,
        text: String,
    },
    /// List collections with document counts
    Collections,
    /// Import documents from a JSON file (array of objects, or object of id -> fields)
    Import {
        collection: String,
        file: PathBuf,
    },
    /// Show a collection as a grid
    Ls {
        collection: String,
        /// Limit rows
        #[arg(long = "limit", default_value_t = 50)]
        limit: usize,
        /// Use inferred schema paths (nested fields included) as columns
        #[arg(long = "paths", action = ArgAction::SetTrue)]
        paths: bool,
    },
    /// Show every field of a document with its classification
    Get {
        collection: String,
        id: String,
    },
    /// Edit one top-level field of a document
    Set {
        collection: String,
        id: String,
        field: String,
        text: String,
        /// Kind to parse as (default: the field's current kind, string when missing)
        #[arg(long = "kind")]
        kind: Option<ValueKind>,
        /// Write dates back in the field's original encoding instead of ISO text
        #[arg(long = "keep-encoding", action = ArgAction::SetTrue)]
        keep_encoding: bool,
    },
    /// Delete a document
    Rm {
        collection: String,
        id: String,
    },
    /// Infer the schema of a collection from a sample
    Schema {
        collection: String,
        /// Documents to sample
        #[arg(long = "sample", env = "DOCGRID_SAMPLE", default_value_t = 200)]
        sample: usize,
    },
}

fn init_tracing() {
    let env = std::env::var("DOCGRID_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DOCGRID_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DOCGRID_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_store(db: Option<&str>) -> Result<SqliteStore> {
    match db {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
    }
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { value } => {
            let raw: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let c = classify(&raw);
            match cli.output {
                Output::Human => print_classification(&c),
                Output::Json => println!("{}", serde_json::to_string_pretty(&c)?),
            }
        }
        Commands::Parse { kind, text } => {
            let parsed = parse_edited(kind, &text).with_context(|| format!("rejected {} edit", kind))?;
            match cli.output {
                Output::Human => print_classification(&parsed.classification()),
                Output::Json => println!("{}", serde_json::to_string_pretty(&parsed.to_raw())?),
            }
        }
        Commands::Collections => {
            let store = open_store(cli.db.as_deref())?;
            let cols = store.collections()?;
            match cli.output {
                Output::Human => {
                    println!("COLLECTION           DOCUMENTS");
                    for c in cols {
                        println!("{:<20} {}", c.name, c.documents);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&cols)?),
            }
        }
        Commands::Import { collection, file } => {
            let store = open_store(cli.db.as_deref())?;
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let value: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
            let records = records_from_json(value)?;
            let total = records.len();
            for (id, fields) in records {
                match id {
                    Some(id) => store.put(&collection, &Document::new(id, fields))?,
                    None => {
                        store.create(&collection, None, fields)?;
                    }
                }
            }
            info!(collection = %collection, total, "import finished");
            match cli.output {
                Output::Human => println!("imported {} documents into {}", total, collection),
                Output::Json => println!("{}", serde_json::json!({ "collection": collection, "imported": total })),
            }
        }
        Commands::Ls { collection, limit, paths } => {
            let store = open_store(cli.db.as_deref())?;
            let docs = store.list(&collection, Some(limit))?;
            info!(collection = %collection, rows = docs.len(), paths, "ls invoked");
            let g = if paths {
                let schema = docgrid_schema::infer_schema(&docs);
                grid::schema_grid(&docs, &schema)
            } else {
                grid::field_grid(&docs)
            };
            match cli.output {
                Output::Human => print!("{}", grid::render_text(&g)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&g)?),
            }
        }
        Commands::Get { collection, id } => {
            let store = open_store(cli.db.as_deref())?;
            let doc = store.get(&collection, &id)?.ok_or_else(|| anyhow!("document not found: {}/{}", collection, id))?;
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<22} {:<9} VALUE", "FIELD", "KIND", "EDITOR");
                    for (key, raw) in doc.fields.iter() {
                        let c = classify(raw);
                        let editor = if c.needs_expanded_editor { "expanded" } else { "inline" };
                        println!("{:<20} {:<22} {:<9} {}", key, kind_label(&c), editor, grid::fit(&c.display_text, 60));
                    }
                }
                Output::Json => {
                    let out: serde_json::Map<String, Value> = doc
                        .fields
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), serde_json::to_value(classify(v))?)))
                        .collect::<Result<_, serde_json::Error>>()?;
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "id": doc.id, "fields": out }))?);
                }
            }
        }
        Commands::Set { collection, id, field, text, kind, keep_encoding } => {
            let store = open_store(cli.db.as_deref())?;
            let doc = store.get(&collection, &id)?.ok_or_else(|| anyhow!("document not found: {}/{}", collection, id))?;
            let current = doc.field(&field);
            let hint = kind.unwrap_or_else(|| current.map(kind_of).unwrap_or(ValueKind::String));
            let mut value = parse_edited(hint, &text).with_context(|| format!("rejected edit of {}", field))?;
            if keep_encoding {
                value = reencode_like(value, current);
            }
            let updated = store.set_field(&collection, &id, &field, &value)?;
            info!(collection = %collection, id = %id, field = %field, kind = %value.kind(), "field updated");
            let c = updated.classify_field(&field);
            match cli.output {
                Output::Human => print_classification(&c),
                Output::Json => println!("{}", serde_json::to_string_pretty(&c)?),
            }
        }
        Commands::Rm { collection, id } => {
            let store = open_store(cli.db.as_deref())?;
            if !store.delete(&collection, &id)? {
                bail!("document not found: {}/{}", collection, id);
            }
            if cli.output == Output::Human {
                println!("deleted {}/{}", collection, id);
            }
        }
        Commands::Schema { collection, sample } => {
            let store = open_store(cli.db.as_deref())?;
            let docs = store.list(&collection, Some(sample))?;
            let schema = docgrid_schema::infer_schema(&docs);
            match cli.output {
                Output::Human => {
                    println!("sampled: {}", schema.sampled);
                    println!("{:<28} {:<8} {:<8} KINDS", "PATH", "PRESENT", "DOMINANT");
                    for f in &schema.fields {
                        let kinds: Vec<String> = f.counts.iter().map(|(k, n)| format!("{}={}", k, n)).collect();
                        let mixed = if f.is_mixed() { " (mixed)" } else { "" };
                        println!("{:<28} {:<8} {:<8} {}{}", f.path, f.present, f.dominant, kinds.join(","), mixed);
                    }
                    let proj: Vec<&str> = schema.projected_paths.iter().map(|p| p.path.as_str()).collect();
                    if proj.is_empty() {
                        println!("projected: (none)");
                    } else {
                        println!("projected: {}", proj.join(", "));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&schema)?),
            }
        }
    }

    Ok(())
}

fn kind_label(c: &Classification) -> String {
    match c.date_encoding {
        Some(enc) => format!("{} ({})", c.kind, enc),
        None => c.kind.to_string(),
    }
}

fn print_classification(c: &Classification) {
    println!("kind:     {}", kind_label(c));
    if let Some(ms) = c.instant_ms {
        println!("instant:  {} ms", ms);
    }
    println!("editor:   {}", if c.needs_expanded_editor { "expanded" } else { "inline" });
    println!("display:  {}", c.display_text);
    if c.edit_text.contains('\n') {
        println!("edit:\n{}", c.edit_text);
    } else {
        println!("edit:     {}", c.edit_text);
    }
}

/// Write an edited date back in the encoding the field already had.
fn reencode_like(value: FieldValue, current: Option<&Value>) -> FieldValue {
    let (Some(current), Some(ms)) = (current, value.instant_ms()) else { return value };
    let Some(encoding) = dates::detect(current) else { return value };
    match dates::encode(encoding, ms, Some(current)) {
        // an instant outside the epoch window would read back as a plain number
        Some(raw) if kind_of(&raw) == ValueKind::DateLike => FieldValue::from_raw(&raw),
        _ => {
            warn!(encoding = %encoding, ms, "cannot keep original date encoding; writing ISO text");
            value
        }
    }
}

/// Documents from an import file: an array of objects (`id`/`_id` string field
/// becomes the id) or an object of id -> fields.
fn records_from_json(value: Value) -> Result<Vec<(Option<String>, Fields)>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(mut fields) => {
                    let id = ["id", "_id"].iter().find_map(|k| match fields.get(*k) {
                        Some(Value::String(s)) => Some(((*k).to_string(), s.clone())),
                        _ => None,
                    });
                    Ok(match id {
                        Some((key, id)) => {
                            fields.remove(&key);
                            (Some(id), fields)
                        }
                        None => (None, fields),
                    })
                }
                other => Err(anyhow!("item {} is not an object: {}", i, other)),
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(id, v)| match v {
                Value::Object(fields) => Ok((Some(id), fields)),
                other => Err(anyhow!("document {} is not an object: {}", id, other)),
            })
            .collect(),
        other => bail!("expected an array or object of documents, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_from_array_take_ids() {
        let recs = records_from_json(json!([{"id": "a", "x": 1}, {"_id": "b"}, {"y": 2}])).unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].0.as_deref(), Some("a"));
        assert!(!recs[0].1.contains_key("id"));
        assert_eq!(recs[1].0.as_deref(), Some("b"));
        assert_eq!(recs[2].0, None);
    }

    #[test]
    fn records_from_object_and_rejects_scalars() {
        let recs = records_from_json(json!({"a": {"x": 1}})).unwrap();
        assert_eq!(recs[0].0.as_deref(), Some("a"));
        assert!(records_from_json(json!([1])).is_err());
        assert!(records_from_json(json!("nope")).is_err());
    }

    #[test]
    fn reencode_keeps_record_and_millis() {
        let edited = parse_edited(ValueKind::DateLike, "2023-11-14T22:13:21Z").unwrap();
        let rec = json!({"_seconds": 1, "_nanoseconds": 0});
        let out = reencode_like(edited.clone(), Some(&rec));
        assert_eq!(out.to_raw(), json!({"_seconds": 1700000001i64, "_nanoseconds": 0}));

        let millis = json!(1_600_000_000_000i64);
        let out = reencode_like(edited.clone(), Some(&millis));
        assert_eq!(out.to_raw(), json!(1_700_000_001_000i64));

        // outside the epoch window the ISO text is kept
        let old = parse_edited(ValueKind::DateLike, "1990-01-01T00:00:00Z").unwrap();
        let out = reencode_like(old.clone(), Some(&millis));
        assert_eq!(out, old);
    }
}
