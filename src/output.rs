//! CLI output formatting for every command.
//!
//! Logging (`RUST_LOG`) narrates what the pipeline is doing; this module
//! prints the summary a user reads when a command finishes.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! Collections
//! 001 properties: 24 records
//! 002 testimonials: skipped (CMS returned 500 for ...)
//! Properties
//!     31 raw → 24 unique (7 duplicates, 0 skipped)
//! Images
//!     40 attempted, 38 downloaded, 2 failed, 1 on placeholders
//! Snapshot → public/data
//! ```
//!
//! ## Slug backfill
//!
//! ```text
//! Slug backfill (dry run)
//! 001 #12 → 3br-villa-in-seminyak
//! Failed
//!     #14: CMS returned 403 for ...
//! 1 would be updated, 3 skipped, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::export::{
    BackfillReport, CheckReport, DedupeStats, ExportReport, ImagesReport, RebuildReport,
};
use crate::images::MaterializeReport;
use crate::rewrite::RewriteReport;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn dedupe_line(stats: &DedupeStats) -> String {
    format!(
        "{}{} raw → {} unique ({} duplicates, {} skipped)",
        indent(1),
        stats.input,
        stats.output,
        stats.duplicates,
        stats.skipped
    )
}

fn images_line(report: &MaterializeReport) -> String {
    format!(
        "{}{} attempted, {} downloaded, {} failed, {} on placeholders",
        indent(1),
        report.attempted,
        report.downloaded,
        report.failed,
        report.placeholders
    )
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// check
// ============================================================================

pub fn format_check(report: &CheckReport) -> Vec<String> {
    match &report.result {
        Ok(total) => vec![format!(
            "CMS OK: {} ({} {})",
            report.cms_url, total, report.collection
        )],
        Err(e) => vec![
            format!("CMS unreachable: {}", report.cms_url),
            format!("{}{}", indent(1), e),
        ],
    }
}

pub fn print_check(report: &CheckReport) {
    print_lines(format_check(report));
}

// ============================================================================
// export
// ============================================================================

/// Format the export summary: per-collection outcome, then dedupe and image
/// counts when those stages ran.
pub fn format_export(report: &ExportReport) -> Vec<String> {
    let mut lines = vec!["Collections".to_string()];
    for (i, collection) in report.collections.iter().enumerate() {
        let outcome = match &collection.error {
            Some(e) => format!("skipped ({e})"),
            None => format!("{} records", collection.records),
        };
        lines.push(format!(
            "{} {}: {}",
            format_index(i + 1),
            collection.name,
            outcome
        ));
    }
    if let Some(stats) = &report.properties {
        lines.push("Properties".to_string());
        lines.push(dedupe_line(stats));
    }
    if let Some(images) = &report.images {
        lines.push("Images".to_string());
        lines.push(images_line(images));
    }
    lines.push(format!("Snapshot → {}", report.data_dir.display()));
    lines
}

pub fn print_export(report: &ExportReport) {
    print_lines(format_export(report));
}

// ============================================================================
// rebuild / images
// ============================================================================

pub fn format_rebuild(report: &RebuildReport) -> Vec<String> {
    vec![
        format!("Rebuild → {}", report.data_dir.display()),
        dedupe_line(&report.stats),
        format!("{}{} image mappings applied", indent(1), report.mappings),
    ]
}

pub fn print_rebuild(report: &RebuildReport) {
    print_lines(format_rebuild(report));
}

pub fn format_images(report: &ImagesReport) -> Vec<String> {
    vec![
        format!("Images → {}", report.data_dir.display()),
        format!("{}{} properties", indent(1), report.properties),
        images_line(&report.images),
        format!("{}{} mappings", indent(1), report.mappings),
    ]
}

pub fn print_images(report: &ImagesReport) {
    print_lines(format_images(report));
}

// ============================================================================
// rewrite
// ============================================================================

pub fn format_rewrite(dir: &Path, report: &RewriteReport) -> Vec<String> {
    vec![
        format!("Rewrite → {}", dir.display()),
        format!("{}{}", indent(1), report),
    ]
}

pub fn print_rewrite(dir: &Path, report: &RewriteReport) {
    print_lines(format_rewrite(dir, report));
}

// ============================================================================
// backfill-slugs
// ============================================================================

/// Format the slug backfill: one line per slug written (or planned), then
/// failures, then a totals line.
pub fn format_backfill(report: &BackfillReport) -> Vec<String> {
    let mut lines = vec![if report.dry_run {
        "Slug backfill (dry run)".to_string()
    } else {
        "Slug backfill".to_string()
    }];
    for (i, update) in report.updated.iter().enumerate() {
        lines.push(format!(
            "{} #{} → {}",
            format_index(i + 1),
            update.id,
            update.slug
        ));
    }
    if !report.failed.is_empty() {
        lines.push("Failed".to_string());
        for (id, reason) in &report.failed {
            lines.push(format!("{}#{}: {}", indent(1), id, reason));
        }
    }
    let verb = if report.dry_run {
        "would be updated"
    } else {
        "updated"
    };
    lines.push(format!(
        "{} {}, {} skipped, {} failed",
        report.updated.len(),
        verb,
        report.skipped,
        report.failed.len()
    ));
    lines
}

pub fn print_backfill(report: &BackfillReport) {
    print_lines(format_backfill(report));
}
