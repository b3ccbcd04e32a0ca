//! Download remote property media and build the URL rewrite table.
//!
//! For every image reference of every property, the original URL and each
//! named size variant get a deterministic local path:
//!
//! ```text
//! https://cms.example.com/uploads/large_pool_3f2a.jpg   (variant "large")
//!   → /property-images/3br-villa-in-seminyak/large-large_pool_3f2a.jpg
//! ```
//!
//! The file is fetched through a [`MediaFetcher`] and written under
//! `<public_dir>/property-images/<slug>/`. The mapping is recorded whether or
//! not the download succeeds. Failures are logged and skipped, never retried
//! and never fatal. A property left with no image file on disk gets the
//! placeholder set instead.

use crate::types::{ImageRef, Property};
use log::{debug, info, warn};
use reqwest::Url;
use reqwest::blocking::Client;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// URL prefix of materialized images on the static site.
pub const LOCAL_PREFIX: &str = "/property-images";

/// Variant name used for the original upload.
pub const ORIGINAL_VARIANT: &str = "original";

/// Remote URL → local static path.
pub type RewriteTable = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
}

/// Source of media bytes. The production implementation is [`HttpFetcher`].
pub trait MediaFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Plain HTTP GET with a fixed per-request timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("listing-export/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Counters from one materialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Distinct remote URLs a download was attempted for.
    pub attempted: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Properties that fell back to the placeholder set.
    pub placeholders: usize,
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Last path segment of a URL, percent-decoded and reduced to
/// `[A-Za-z0-9._-]`. Falls back to `image`.
pub fn original_filename(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| {
            let path = url.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().unwrap_or_default().to_string()
        });
    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);
    path_safe(&decoded, "image")
}

/// Reduce a name to `[A-Za-z0-9._-]` with no leading or trailing `-`/`.`,
/// so it is a single path segment.
fn path_safe(name: &str, fallback: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `/property-images/<slug>/<variant>-<original-filename>`
pub fn local_path(slug: &str, variant: &str, url: &str) -> String {
    format!(
        "{LOCAL_PREFIX}/{slug}/{}-{}",
        path_safe(variant, "variant"),
        original_filename(url)
    )
}

/// `local` itself, or `local` with `-2`, `-3`, ... before the extension
/// when another URL already owns it.
fn unclaimed(local: String, claimed: &HashSet<String>) -> String {
    if !claimed.contains(&local) {
        return local;
    }
    let (stem, extension) = match local.rsplit_once('.') {
        Some((stem, ext)) if !stem.ends_with('/') && !ext.contains('/') => {
            (stem.to_string(), format!(".{ext}"))
        }
        _ => (local.clone(), String::new()),
    };
    (2..)
        .map(|n| format!("{stem}-{n}{extension}"))
        .find(|candidate| !claimed.contains(candidate))
        .unwrap_or(local)
}

/// Every (variant, url) pair of an image: the original first, then the
/// named sizes in name order.
fn variants(image: &ImageRef) -> Vec<(&str, &str)> {
    std::iter::once((ORIGINAL_VARIANT, image.url.as_str()))
        .chain(
            image
                .formats
                .iter()
                .map(|(name, url)| (name.as_str(), url.as_str())),
        )
        .collect()
}

/// Apply the rewrite table to a property's image URLs in place.
pub fn rewrite_property(property: &mut Property, table: &RewriteTable) {
    for image in &mut property.images {
        if let Some(local) = table.get(&image.url) {
            image.url = local.clone();
        }
        for url in image.formats.values_mut() {
            if let Some(local) = table.get(url.as_str()) {
                *url = local.clone();
            }
        }
    }
}

/// Whether any of the property's image URLs points at a file that exists
/// under `images_root`.
fn has_materialized_file(property: &Property, images_root: &Path) -> bool {
    property
        .images
        .iter()
        .flat_map(|image| std::iter::once(&image.url).chain(image.formats.values()))
        .filter_map(|url| url.strip_prefix(LOCAL_PREFIX)?.strip_prefix('/'))
        .any(|relative| images_root.join(relative).is_file())
}

fn placeholder_images(placeholders: &[String]) -> Vec<ImageRef> {
    placeholders.iter().map(ImageRef::new).collect()
}

fn download(fetcher: &impl MediaFetcher, url: &str, target: &Path) -> Result<(), String> {
    let bytes = fetcher.fetch(url).map_err(|e| e.to_string())?;
    let format = image::guess_format(&bytes).map_err(|_| "payload is not an image".to_string())?;
    debug!("{url}: {format:?}, {} bytes", bytes.len());
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(target, &bytes).map_err(|e| e.to_string())
}

/// Download media for every property, extend `table`, rewrite image URLs,
/// and substitute placeholders where nothing was materialized.
///
/// `images_root` is the on-disk directory behind [`LOCAL_PREFIX`]. Records
/// are processed in slice order.
pub fn materialize(
    properties: &mut [Property],
    images_root: &Path,
    placeholders: &[String],
    fetcher: &impl MediaFetcher,
    table: &mut RewriteTable,
) -> MaterializeReport {
    let mut report = MaterializeReport::default();
    let mut claimed: HashSet<String> = table.values().cloned().collect();

    for property in properties.iter_mut() {
        let property_dir = images_root.join(&property.slug);
        let mut pending: Vec<(String, String)> = Vec::new();
        for image in &property.images {
            for (variant, url) in variants(image) {
                if is_remote(url) && !table.contains_key(url) {
                    let local = unclaimed(local_path(&property.slug, variant, url), &claimed);
                    claimed.insert(local.clone());
                    table.insert(url.to_string(), local.clone());
                    pending.push((url.to_string(), local));
                }
            }
        }

        for (url, local) in pending {
            report.attempted += 1;
            let file_name = local.rsplit('/').next().unwrap_or_default();
            let target = property_dir.join(file_name);
            match download(fetcher, &url, &target) {
                Ok(()) => report.downloaded += 1,
                Err(reason) => {
                    warn!("Image download failed for {url}: {reason}");
                    report.failed += 1;
                }
            }
        }

        rewrite_property(property, table);

        if !has_materialized_file(property, images_root) {
            debug!("{}: no images on disk, using placeholders", property.slug);
            property.images = placeholder_images(placeholders);
            report.placeholders += 1;
        }
    }

    info!(
        "Images: {} downloaded, {} failed, {} properties on placeholders",
        report.downloaded, report.failed, report.placeholders
    );
    report
}
