//! Pipeline orchestration: wires the stages together for each CLI command.
//!
//! ```text
//! export     CMS ──▶ normalize ──▶ dedupe ──▶ [images] ──▶ snapshot
//! rebuild    snapshot sources ──▶ dedupe ──▶ existing mappings ──▶ snapshot
//! images     snapshot ──▶ images ──▶ snapshot
//! ```
//!
//! Every stage receives the [`ExportConfig`] and its collaborators as
//! arguments. Per-collection and per-image failures are logged and counted;
//! configuration, malformed snapshot JSON and write failures abort the run.

use crate::cms::{CmsError, ContentApi, record_key};
use crate::config::ExportConfig;
use crate::dedupe::{Deduplicated, RawRecord, RecordSource, deduplicate};
use crate::images::{MaterializeReport, MediaFetcher, RewriteTable, materialize, rewrite_property};
use crate::normalize::{existing_slug, flatten, normalize};
use crate::snapshot::{self, SnapshotError, SnapshotMetadata};
use crate::sources::{SourceError, load_snapshot_sources};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Counts from a dedupe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeStats {
    /// Raw records fed in.
    pub input: usize,
    /// Canonical records written.
    pub output: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl DedupeStats {
    fn new(input: usize, deduped: &Deduplicated) -> Self {
        Self {
            input,
            output: deduped.properties.len(),
            duplicates: deduped.duplicates,
            skipped: deduped.skipped,
        }
    }
}

/// Outcome for one configured collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResult {
    pub name: String,
    /// Records written; zero when the fetch failed.
    pub records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub data_dir: PathBuf,
    pub collections: Vec<CollectionResult>,
    /// Present when the property collection was fetched.
    pub properties: Option<DedupeStats>,
    /// Present when images were materialized.
    pub images: Option<MaterializeReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebuildReport {
    pub data_dir: PathBuf,
    pub stats: DedupeStats,
    /// Entries in the rewrite table that was applied.
    pub mappings: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagesReport {
    pub data_dir: PathBuf,
    pub properties: usize,
    pub images: MaterializeReport,
    pub mappings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugUpdate {
    pub id: u64,
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub dry_run: bool,
    /// Slugs written, or that would be written on a dry run.
    pub updated: Vec<SlugUpdate>,
    /// Records that already had a slug or had no ID.
    pub skipped: usize,
    pub failed: Vec<(u64, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub cms_url: String,
    pub collection: String,
    /// `Ok(total)` or the error message.
    pub result: Result<u64, String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Connectivity check against the property collection.
pub fn check(config: &ExportConfig, cms: &impl ContentApi) -> CheckReport {
    let collection = &config.cms.property_collection;
    let result = cms.ping(collection).map_err(|e| e.to_string());
    match &result {
        Ok(total) => info!("CMS reachable at {}: {total} {collection}", cms.base_url()),
        Err(e) => warn!("CMS check failed: {e}"),
    }
    CheckReport {
        cms_url: cms.base_url().to_string(),
        collection: collection.clone(),
        result,
    }
}

/// New mappings win; older ones are kept so pages rendered against earlier
/// exports still resolve.
fn merge_mappings(mut fresh: RewriteTable, previous: RewriteTable) -> RewriteTable {
    for (remote, local) in previous {
        fresh.entry(remote).or_insert(local);
    }
    fresh
}

/// Full export from the CMS into the snapshot directory.
pub fn run_export(
    config: &ExportConfig,
    cms: &impl ContentApi,
    fetcher: &impl MediaFetcher,
) -> Result<ExportReport, ExportError> {
    let data_dir = &config.output.data_dir;
    let mut report = ExportReport {
        data_dir: data_dir.clone(),
        collections: Vec::new(),
        properties: None,
        images: None,
    };
    let mut counts = BTreeMap::new();
    let mut table = RewriteTable::new();

    for collection in &config.cms.collections {
        let records = match cms.fetch_collection(collection) {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping collection {collection}: {e}");
                counts.insert(collection.clone(), 0);
                report.collections.push(CollectionResult {
                    name: collection.clone(),
                    records: 0,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let written = if *collection == config.cms.property_collection {
            let raw: Vec<RawRecord> = records
                .into_iter()
                .map(|v| RawRecord::new(RecordSource::Cms, v))
                .collect();
            let mut deduped = deduplicate(&raw, Some(cms.base_url()));
            report.properties = Some(DedupeStats::new(raw.len(), &deduped));
            if config.static_export {
                report.images = Some(materialize(
                    &mut deduped.properties,
                    &config.images_root(),
                    &config.images.placeholders,
                    fetcher,
                    &mut table,
                ));
            }
            snapshot::write_properties(data_dir, collection, &deduped.properties)?
        } else {
            let flat: Vec<Value> = records.iter().map(flatten).collect();
            snapshot::write_collection(data_dir, collection, &flat)?
        };

        info!("{collection}: wrote {written} records");
        counts.insert(collection.clone(), written);
        report.collections.push(CollectionResult {
            name: collection.clone(),
            records: written,
            error: None,
        });
    }

    if config.static_export {
        let previous = snapshot::load_image_mappings(data_dir)?;
        snapshot::write_image_mappings(data_dir, &merge_mappings(table, previous))?;
    }
    snapshot::write_metadata(data_dir, &SnapshotMetadata::new(cms.base_url(), counts))?;
    Ok(report)
}

/// Refresh `metadata.json` after an offline pass touched one collection.
fn refresh_metadata(config: &ExportConfig, written: usize) -> Result<(), ExportError> {
    let data_dir = &config.output.data_dir;
    let (cms_url, mut counts) = match snapshot::load_metadata(data_dir)? {
        Some(existing) => (existing.cms_url, existing.collections),
        None => (config.cms_base_url().to_string(), BTreeMap::new()),
    };
    counts.insert(config.cms.property_collection.clone(), written);
    snapshot::write_metadata(data_dir, &SnapshotMetadata::new(&cms_url, counts))?;
    Ok(())
}

/// Offline: dedupe every copy of every property already on disk, regenerate
/// slugs and rewrite the snapshot. Applies the existing image mappings but
/// downloads nothing.
pub fn run_rebuild(config: &ExportConfig) -> Result<RebuildReport, ExportError> {
    let data_dir = &config.output.data_dir;
    let collection = &config.cms.property_collection;

    let records = load_snapshot_sources(data_dir, collection)?;
    let mut deduped = deduplicate(&records, None);
    let table = snapshot::load_image_mappings(data_dir)?;
    for property in &mut deduped.properties {
        rewrite_property(property, &table);
    }

    let stats = DedupeStats::new(records.len(), &deduped);
    info!(
        "Rebuild: {} raw records → {} properties ({} duplicates, {} skipped)",
        stats.input, stats.output, stats.duplicates, stats.skipped
    );
    let written = snapshot::write_properties(data_dir, collection, &deduped.properties)?;
    refresh_metadata(config, written)?;

    Ok(RebuildReport {
        data_dir: data_dir.clone(),
        stats,
        mappings: table.len(),
    })
}

/// Offline: materialize images for the current snapshot and rewrite it.
pub fn run_images(
    config: &ExportConfig,
    fetcher: &impl MediaFetcher,
) -> Result<ImagesReport, ExportError> {
    let data_dir = &config.output.data_dir;
    let collection = &config.cms.property_collection;

    let mut properties = snapshot::load_properties(data_dir, collection)?;
    let mut table = RewriteTable::new();
    let images = materialize(
        &mut properties,
        &config.images_root(),
        &config.images.placeholders,
        fetcher,
        &mut table,
    );

    let written = snapshot::write_properties(data_dir, collection, &properties)?;
    let table = merge_mappings(table, snapshot::load_image_mappings(data_dir)?);
    snapshot::write_image_mappings(data_dir, &table)?;
    refresh_metadata(config, written)?;

    Ok(ImagesReport {
        data_dir: data_dir.clone(),
        properties: written,
        images,
        mappings: table.len(),
    })
}

/// Write a generated slug back to every CMS property that has none.
pub fn backfill_slugs(
    config: &ExportConfig,
    cms: &impl ContentApi,
    dry_run: bool,
) -> Result<BackfillReport, ExportError> {
    let collection = &config.cms.property_collection;
    let records = cms.fetch_collection(collection)?;
    let mut report = BackfillReport {
        dry_run,
        ..BackfillReport::default()
    };

    for raw in &records {
        if existing_slug(raw).is_some() {
            report.skipped += 1;
            continue;
        }
        let Some(property) = normalize(raw, None) else {
            warn!("Skipping record without numeric id");
            report.skipped += 1;
            continue;
        };
        let Some(key) = record_key(&flatten(raw)) else {
            report.skipped += 1;
            continue;
        };

        if dry_run {
            info!("Would set slug of {} to {}", property.id, property.slug);
        } else if let Err(e) = cms.update_slug(collection, &key, &property.slug) {
            warn!("Slug update failed for {}: {e}", property.id);
            report.failed.push((property.id, e.to_string()));
            continue;
        }
        report.updated.push(SlugUpdate {
            id: property.id,
            slug: property.slug,
        });
    }

    Ok(report)
}
