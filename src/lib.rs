//! # listing-export
//!
//! Exports property listings from a headless CMS into a static JSON snapshot
//! that a static site build consumes, optionally downloading every referenced
//! image so the site has no runtime dependency on the CMS.
//!
//! # Architecture: Five-Stage Pipeline
//!
//! ```text
//! 1. CMS client      GET /api/<collection>  →  raw records
//! 2. Normalize       raw records            →  canonical Property
//! 3. Dedupe          many copies per ID     →  one per ID, slug regenerated
//! 4. Images          remote media URLs      →  public/property-images/<slug>/
//! 5. Snapshot        canonical records      →  public/data/*.json
//! ```
//!
//! The same stages run offline against an existing snapshot (`rebuild`,
//! `images`), so a snapshot full of duplicates from earlier runs can be
//! cleaned up without the CMS.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `listing-export.toml` loading, env overrides, validation |
//! | [`cms`] | Paginated blocking client for the CMS content API |
//! | [`normalize`] | Raw record of any shape → canonical [`types::Property`] |
//! | [`naming`] | Title → URL slug |
//! | [`dedupe`] | Completeness scoring and per-ID collapse |
//! | [`sources`] | Reads every overlapping copy of a record from a snapshot |
//! | [`images`] | Media download, local path layout, placeholders |
//! | [`snapshot`] | Atomic JSON output, stale-file cleanup, image mappings |
//! | [`rewrite`] | Applies the image mappings to an exported site |
//! | [`export`] | Orchestrates the stages for each command |
//! | [`types`] | Canonical record and index types |
//! | [`output`] | CLI summaries |
//!
//! # Design Decisions
//!
//! ## Explicit Configuration
//!
//! One [`config::ExportConfig`] is built per run and passed to each stage.
//! Nothing reads the environment after startup, and there is no shared
//! client: tests hand the stages a mock CMS and a mock media fetcher.
//!
//! ## Slugs Belong to Titles
//!
//! The winning record's slug is regenerated from its title on every run. A
//! slug edited by hand in the CMS is not preserved. `backfill-slugs` writes
//! generated slugs only to records that have none.
//!
//! ## Best-Effort Runs
//!
//! A collection that fails to fetch or an image that fails to download is
//! logged and counted; the rest of the run proceeds. What cannot be skipped
//! is a bad config, an unreadable snapshot file, or a failed write.

pub mod cms;
pub mod config;
pub mod dedupe;
pub mod export;
pub mod images;
pub mod naming;
pub mod normalize;
pub mod output;
pub mod rewrite;
pub mod snapshot;
pub mod sources;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
