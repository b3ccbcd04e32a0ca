//! Load raw records from an existing snapshot directory.
//!
//! Offline rebuilds read every overlapping source that may hold a copy of a
//! property:
//!
//! ```text
//! data/
//! ├── properties.json          # full dump (array or {data: [...]})
//! ├── property-index.json      # lightweight listing index
//! ├── properties-12.json       # one record per ID ({...} or {data: {...}})
//! └── properties-42.json
//! ```
//!
//! Missing files count as empty. A file that exists but is not valid JSON
//! is an error: rebuilding from a half-read snapshot would silently drop
//! listings.

use crate::dedupe::{RawRecord, RecordSource};
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of the lightweight listing index.
pub const INDEX_FILENAME: &str = "property-index.json";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read a JSON file. `Ok(None)` if it doesn't exist.
pub fn read_json(path: &Path) -> Result<Option<Value>, SourceError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SourceError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Records held by a collection-shaped document: a bare array, a
/// `{data: [...]}` envelope, or a single record (`{...}` / `{data: {...}}`).
pub fn records_in(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Object(single)) => vec![Value::Object(single)],
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                map.insert("data".to_string(), other);
                vec![Value::Object(map)]
            }
            None if map.is_empty() => Vec::new(),
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

/// Whether `file_name` is `<collection>-<digits>.json`; returns the ID.
pub fn per_id_file(file_name: &str, collection: &str) -> Option<u64> {
    file_name
        .strip_prefix(collection)?
        .strip_prefix('-')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Every `<collection>-<id>.json` directly inside `data_dir`, sorted by ID.
pub fn per_id_files(data_dir: &Path, collection: &str) -> Vec<(u64, PathBuf)> {
    let mut files: Vec<(u64, PathBuf)> = WalkDir::new(data_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            per_id_file(&name, collection).map(|id| (id, e.into_path()))
        })
        .collect();
    files.sort();
    files
}

/// Load all raw copies of a collection's records from a snapshot directory,
/// in source order: full dump, index, then per-ID files.
pub fn load_snapshot_sources(
    data_dir: &Path,
    collection: &str,
) -> Result<Vec<RawRecord>, SourceError> {
    let mut records = Vec::new();

    let dump_path = data_dir.join(format!("{collection}.json"));
    if let Some(doc) = read_json(&dump_path)? {
        let items = records_in(doc);
        debug!("{}: {} records", dump_path.display(), items.len());
        records.extend(
            items
                .into_iter()
                .map(|v| RawRecord::new(RecordSource::CollectionDump, v)),
        );
    }

    let index_path = data_dir.join(INDEX_FILENAME);
    if let Some(doc) = read_json(&index_path)? {
        let items = records_in(doc);
        debug!("{}: {} records", index_path.display(), items.len());
        records.extend(
            items
                .into_iter()
                .map(|v| RawRecord::new(RecordSource::Index, v)),
        );
    }

    for (_, path) in per_id_files(data_dir, collection) {
        if let Some(doc) = read_json(&path)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            records.extend(
                records_in(doc)
                    .into_iter()
                    .map(|v| RawRecord::new(RecordSource::PerId(name.clone()), v)),
            );
        }
    }

    Ok(records)
}
