//! Apply the image rewrite table to an already-exported static site.
//!
//! Pages rendered before images were materialized still reference the CMS.
//! This walks the export directory and replaces every mapped remote URL in
//! `.html` and `.js` files with its local path. Longer URLs are replaced
//! first, so `https://cms/uploads/a.jpg` cannot clobber part of
//! `https://cms/uploads/a.jpg.webp`.

use crate::images::RewriteTable;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["html", "js"];

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub replacements: usize,
}

impl fmt::Display for RewriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} replacements in {} of {} files",
            self.replacements, self.files_changed, self.files_scanned
        )
    }
}

fn is_rewritable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Replace every mapped URL in `content`. Returns the new text and the
/// number of occurrences replaced.
pub fn rewrite_text(content: &str, ordered: &[(&str, &str)]) -> (String, usize) {
    let mut text = content.to_string();
    let mut count = 0;
    for &(remote, local) in ordered {
        let hits = text.matches(remote).count();
        if hits > 0 {
            text = text.replace(remote, local);
            count += hits;
        }
    }
    (text, count)
}

/// Mapping entries ordered longest remote URL first.
fn longest_first(mappings: &RewriteTable) -> Vec<(&str, &str)> {
    let mut ordered: Vec<(&str, &str)> = mappings
        .iter()
        .filter(|(remote, _)| !remote.is_empty())
        .map(|(remote, local)| (remote.as_str(), local.as_str()))
        .collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
    ordered
}

pub fn rewrite_static_export(
    dir: &Path,
    mappings: &RewriteTable,
) -> Result<RewriteReport, RewriteError> {
    if !dir.is_dir() {
        return Err(RewriteError::NotADirectory(dir.to_path_buf()));
    }
    let ordered = longest_first(mappings);
    let mut report = RewriteReport::default();

    let files = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_rewritable(e.path()));

    for entry in files {
        let path = entry.path();
        report.files_scanned += 1;
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                debug!("skipping non-UTF-8 file {}", path.display());
                continue;
            }
            Err(source) => {
                return Err(RewriteError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let (rewritten, count) = rewrite_text(&content, &ordered);
        if count == 0 {
            continue;
        }
        fs::write(path, rewritten).map_err(|source| RewriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("{}: {count} replacements", path.display());
        report.files_changed += 1;
        report.replacements += count;
    }

    info!("Rewrite of {}: {report}", dir.display());
    Ok(report)
}
