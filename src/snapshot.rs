//! Snapshot writer: the JSON files the static site reads at build time.
//!
//! ## Output Structure
//!
//! ```text
//! data/
//! ├── properties.json              # full array, pipeline order
//! ├── properties-12.json           # one file per ID
//! ├── properties/
//! │   └── 3br-villa-in-seminyak.json   # one file per slug
//! ├── property-index.json          # listing-card fields only
//! ├── testimonials.json            # other collections: dump + per-ID
//! ├── testimonials-3.json
//! ├── metadata.json                # timestamp, version, per-collection counts
//! ├── image-mappings.json          # remote URL → local path
//! └── image-converter.js           # applies the mapping in the browser
//! ```
//!
//! Every run regenerates the snapshot: stale per-ID files and the per-slug
//! directory of a collection are deleted before it is written. Each file is
//! written to a temporary sibling and renamed into place, so a reader never
//! sees a half-written file. Files are not consistent with *each other* if
//! the process dies mid-run; the next run rewrites everything.

use crate::images::RewriteTable;
use crate::normalize::{normalize, record_id};
use crate::sources::{self, INDEX_FILENAME, SourceError, per_id_files, records_in};
use crate::types::{IndexEntry, Property};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const METADATA_FILENAME: &str = "metadata.json";
pub const MAPPINGS_FILENAME: &str = "image-mappings.json";
pub const CONVERTER_FILENAME: &str = "image-converter.js";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// RFC 3339 timestamp of the run.
    pub exported_at: String,
    pub generator: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cms_url: String,
    /// Records written per collection.
    pub collections: BTreeMap<String, usize>,
}

impl SnapshotMetadata {
    pub fn new(cms_url: &str, collections: BTreeMap<String, usize>) -> Self {
        Self {
            exported_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            generator: concat!("listing-export ", env!("CARGO_PKG_VERSION")).to_string(),
            cms_url: cms_url.to_string(),
            collections,
        }
    }
}

/// Serialize `value` as pretty JSON into `path` via temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SnapshotError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Delete per-ID files and the per-slug directory of a collection.
pub fn clear_collection(data_dir: &Path, collection: &str) -> Result<usize, SnapshotError> {
    let mut removed = 0;
    for (_, path) in per_id_files(data_dir, collection) {
        fs::remove_file(&path)?;
        removed += 1;
    }
    let slug_dir = data_dir.join(collection);
    if slug_dir.is_dir() {
        fs::remove_dir_all(&slug_dir)?;
    }
    Ok(removed)
}

/// Write the property collection: full dump, per-ID, per-slug and index.
/// Returns the number of records written.
pub fn write_properties(
    data_dir: &Path,
    collection: &str,
    properties: &[Property],
) -> Result<usize, SnapshotError> {
    clear_collection(data_dir, collection)?;
    write_json_atomic(&data_dir.join(format!("{collection}.json")), properties)?;

    let mut slugs: HashMap<&str, u64> = HashMap::new();
    for property in properties {
        write_json_atomic(
            &data_dir.join(format!("{collection}-{}.json", property.id)),
            property,
        )?;
        if let Some(previous) = slugs.insert(&property.slug, property.id) {
            warn!(
                "Slug {:?} shared by ids {previous} and {}; {} wins the slug file",
                property.slug, property.id, property.id
            );
        }
        write_json_atomic(
            &data_dir.join(collection).join(format!("{}.json", property.slug)),
            property,
        )?;
    }

    let index: Vec<IndexEntry> = properties.iter().map(IndexEntry::from).collect();
    write_json_atomic(&data_dir.join(INDEX_FILENAME), &index)?;
    Ok(properties.len())
}

/// Write a non-property collection as-is: full dump plus one file per
/// record that has a numeric ID.
pub fn write_collection(
    data_dir: &Path,
    collection: &str,
    records: &[Value],
) -> Result<usize, SnapshotError> {
    clear_collection(data_dir, collection)?;
    write_json_atomic(&data_dir.join(format!("{collection}.json")), records)?;
    for record in records {
        if let Some(id) = record_id(record) {
            write_json_atomic(&data_dir.join(format!("{collection}-{id}.json")), record)?;
        }
    }
    Ok(records.len())
}

pub fn write_metadata(data_dir: &Path, metadata: &SnapshotMetadata) -> Result<(), SnapshotError> {
    write_json_atomic(&data_dir.join(METADATA_FILENAME), metadata)
}

/// Write `image-mappings.json` and the browser-side converter script.
pub fn write_image_mappings(data_dir: &Path, table: &RewriteTable) -> Result<(), SnapshotError> {
    write_json_atomic(&data_dir.join(MAPPINGS_FILENAME), table)?;
    write_atomic(
        &data_dir.join(CONVERTER_FILENAME),
        converter_script(table)?.as_bytes(),
    )
}

const CONVERTER_TEMPLATE: &str = r#"// Generated by listing-export. Do not edit.
// Rewrites CMS image URLs that were not rewritten at build time to their
// local static copies.
(function () {
  var mappings = __MAPPINGS__;
  function rewrite(img) {
    var src = img.getAttribute('src');
    if (src && Object.prototype.hasOwnProperty.call(mappings, src)) {
      img.setAttribute('src', mappings[src]);
    }
  }
  function rewriteAll(root) {
    if (root.tagName === 'IMG') rewrite(root);
    if (root.querySelectorAll) root.querySelectorAll('img[src]').forEach(rewrite);
  }
  function start() {
    rewriteAll(document);
    new MutationObserver(function (records) {
      records.forEach(function (record) {
        if (record.type === 'attributes') {
          rewrite(record.target);
          return;
        }
        record.addedNodes.forEach(function (node) {
          if (node.nodeType === 1) rewriteAll(node);
        });
      });
    }).observe(document.documentElement, {
      childList: true,
      subtree: true,
      attributes: true,
      attributeFilter: ['src']
    });
  }
  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', start);
  } else {
    start();
  }
})();
"#;

/// Render `image-converter.js` with the mapping embedded.
pub fn converter_script(table: &RewriteTable) -> Result<String, SnapshotError> {
    let json = serde_json::to_string(table)?;
    Ok(CONVERTER_TEMPLATE.replace("__MAPPINGS__", &json))
}

/// Read `image-mappings.json`. Missing file = empty table.
pub fn load_image_mappings(data_dir: &Path) -> Result<RewriteTable, SnapshotError> {
    match sources::read_json(&data_dir.join(MAPPINGS_FILENAME))? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(RewriteTable::new()),
    }
}

pub fn load_metadata(data_dir: &Path) -> Result<Option<SnapshotMetadata>, SnapshotError> {
    match sources::read_json(&data_dir.join(METADATA_FILENAME))? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Read the property dump back as canonical records.
pub fn load_properties(data_dir: &Path, collection: &str) -> Result<Vec<Property>, SnapshotError> {
    let Some(doc) = sources::read_json(&data_dir.join(format!("{collection}.json")))? else {
        return Ok(Vec::new());
    };
    Ok(records_in(doc)
        .iter()
        .filter_map(|record| normalize(record, None))
        .collect())
}
