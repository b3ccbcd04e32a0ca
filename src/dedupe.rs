//! Collapse duplicate raw records into one canonical record per ID.
//!
//! The same property can show up several times: in the full collection
//! dump, in the lightweight index, in its own per-ID file, or twice across
//! CMS pages when content changes mid-fetch. Copies are grouped by numeric
//! ID and the most complete one wins.
//!
//! ## Completeness score
//!
//! | Field | Points |
//! |---|---|
//! | title, description, location | +1 each |
//! | bedrooms, bathrooms | +2 each |
//! | area | +1 |
//! | non-empty amenities | +3 |
//! | non-empty images | +2 |
//!
//! Bedrooms, bathrooms and area score nothing when zero, since canonical
//! records write `0` for values that were never known. Capitalized and
//! lowercase keys both count, and an empty location does not hide a
//! populated one further down the chain. A nested `attributes` object
//! is scored the same way and added. The higher total wins; on a tie the
//! first-seen copy is kept.
//!
//! The winner's slug is always regenerated from its title, so a slug edited
//! by hand in the CMS does not survive an export.

use crate::normalize::{
    AMENITIES, AREA, Accessor, BATHROOMS, BEDROOMS, DESCRIPTION, GALLERY, LOCATION, MAIN_IMAGE,
    TITLE, is_populated, normalize, record_id, resolve,
};
use crate::types::Property;
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Where a raw record was read from. Only used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    /// A page of the live CMS collection.
    Cms,
    /// `<collection>.json` in the snapshot directory.
    CollectionDump,
    /// `property-index.json`.
    Index,
    /// `<collection>-<id>.json`.
    PerId(String),
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::Cms => write!(f, "cms"),
            RecordSource::CollectionDump => write!(f, "collection dump"),
            RecordSource::Index => write!(f, "index"),
            RecordSource::PerId(file) => write!(f, "{file}"),
        }
    }
}

/// A raw record tagged with its origin.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: RecordSource,
    pub value: Value,
}

impl RawRecord {
    pub fn new(source: RecordSource, value: Value) -> Self {
        Self { source, value }
    }
}

/// Outcome of a deduplication pass.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// One record per ID, in first-seen order.
    pub properties: Vec<Property>,
    /// Raw records that shared an ID with an earlier one.
    pub duplicates: usize,
    /// Raw records with no usable numeric ID.
    pub skipped: usize,
}

const TEXT_WEIGHTS: &[(&[Accessor], u32)] = &[(TITLE, 1), (DESCRIPTION, 1), (LOCATION, 1)];

const COUNT_WEIGHTS: &[(&[Accessor], u32)] = &[(BEDROOMS, 2), (BATHROOMS, 2), (AREA, 1)];

/// Heuristic completeness of a raw record. See the module docs for weights.
pub fn completeness_score(raw: &Value) -> u32 {
    let mut score = shallow_score(raw);
    if let Some(attributes) = raw.get("attributes").filter(|a| a.is_object()) {
        score += shallow_score(attributes);
    }
    score
}

fn shallow_score(record: &Value) -> u32 {
    let text: u32 = TEXT_WEIGHTS
        .iter()
        .filter(|(chain, _)| resolve(record, chain).is_some())
        .map(|(_, weight)| weight)
        .sum();
    let counts: u32 = COUNT_WEIGHTS
        .iter()
        .filter(|(chain, _)| has_count(record, chain))
        .map(|(_, weight)| weight)
        .sum();
    let mut score = text + counts;
    if has_items(record, AMENITIES) {
        score += 3;
    }
    if has_items(record, MAIN_IMAGE) || has_items(record, GALLERY) {
        score += 2;
    }
    score
}

/// Whether a count-like field holds something other than zero. Canonical
/// records store `0` for counts that could not be resolved.
fn has_count(record: &Value, chain: &[Accessor]) -> bool {
    locations(record, chain).any(|value| match value {
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.trim().parse::<f64>().is_ok_and(|n| n == 0.0),
        _ => true,
    })
}

/// Whether a list-valued field holds at least one entry at any of its
/// locations. Relation wrappers (`{data: [...]}`) count by their contents;
/// a single media object counts as one entry.
fn has_items(record: &Value, chain: &[Accessor]) -> bool {
    locations(record, chain).any(|value| match value.get("data") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Null) => false,
        _ => true,
    })
}

fn locations<'a>(record: &'a Value, chain: &'a [Accessor]) -> impl Iterator<Item = &'a Value> {
    chain
        .iter()
        .filter_map(move |accessor| accessor.lookup(record))
        .filter(|value| is_populated(value))
}

/// Group by ID, keep the most complete copy, normalize it and regenerate its
/// slug.
pub fn deduplicate(records: &[RawRecord], media_base: Option<&str>) -> Deduplicated {
    let mut order: Vec<u64> = Vec::new();
    let mut best: HashMap<u64, (u32, &RawRecord)> = HashMap::new();
    let mut result = Deduplicated::default();

    for record in records {
        let Some(id) = record_id(&crate::normalize::flatten(&record.value)) else {
            warn!("Skipping record without numeric id from {}", record.source);
            result.skipped += 1;
            continue;
        };
        let score = completeness_score(&record.value);
        match best.get_mut(&id) {
            None => {
                order.push(id);
                best.insert(id, (score, record));
            }
            Some(current) => {
                result.duplicates += 1;
                if score > current.0 {
                    debug!(
                        "id {id}: {} (score {score}) replaces {} (score {})",
                        record.source, current.1.source, current.0
                    );
                    *current = (score, record);
                }
            }
        }
    }

    for id in order {
        let Some((_, record)) = best.get(&id) else {
            continue;
        };
        match normalize(&record.value, media_base) {
            Some(property) => result.properties.push(property),
            None => result.skipped += 1,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ids, raw, raw_from};
    use serde_json::json;

    #[test]
    fn score_counts_weighted_fields() {
        assert_eq!(completeness_score(&json!({"id": 1})), 0);
        assert_eq!(completeness_score(&json!({"id": 1, "Title": "X"})), 1);
        assert_eq!(
            completeness_score(&json!({"id": 1, "Title": "X", "Bedrooms": 2, "Amenities": ["Pool"]})),
            6
        );
        assert_eq!(
            completeness_score(&json!({
                "title": "X", "description": "d", "location": "l",
                "bedrooms": 1, "bathrooms": 1, "area": 90,
                "amenities": ["Pool"], "images": [{"url": "/a.jpg"}]
            })),
            1 + 1 + 1 + 2 + 2 + 1 + 3 + 2
        );
    }

    #[test]
    fn empty_values_do_not_score() {
        assert_eq!(
            completeness_score(&json!({
                "Title": "", "Description": null, "Amenities": [],
                "Image": {"data": []}, "MainImage": {"data": null}
            })),
            0
        );
    }

    #[test]
    fn zero_counts_do_not_score() {
        assert_eq!(
            completeness_score(&json!({"id": 1, "bedrooms": 0, "bathrooms": 0, "area": 0})),
            0
        );
        assert_eq!(completeness_score(&json!({"id": 1, "Area": "0"})), 0);
        assert_eq!(completeness_score(&json!({"id": 1, "Bedrooms": 0, "bedrooms": 3})), 2);
    }

    #[test]
    fn empty_gallery_key_does_not_hide_later_one() {
        let value = json!({"id": 1, "Image": {"data": []}, "images": [{"url": "/a.jpg"}]});
        assert_eq!(completeness_score(&value), 2);
    }

    #[test]
    fn canonical_defaults_lose_to_richer_raw_copy() {
        let canonical = json!({
            "id": 5, "slug": "loft", "title": "Loft", "description": "",
            "price": 0.0, "location": "", "propertyType": "",
            "bedrooms": 0, "bathrooms": 0, "area": 0,
            "images": [], "amenities": [], "status": "published", "featured": false,
            "createdAt": "", "updatedAt": ""
        });
        let richer = json!({
            "id": 5, "Title": "Loft", "Description": "Sea view",
            "Location": "Canggu", "Area": "90 m2"
        });
        assert!(completeness_score(&richer) > completeness_score(&canonical));

        let records = vec![
            raw_from(RecordSource::CollectionDump, canonical),
            raw_from(RecordSource::PerId("properties-5.json".into()), richer),
        ];
        let out = deduplicate(&records, None);
        let winner = &out.properties[0];
        assert_eq!(winner.description, "Sea view");
        assert_eq!(winner.location, "Canggu");
    }

    #[test]
    fn nested_attributes_accumulate() {
        let value = json!({
            "id": 1,
            "Title": "Outer",
            "attributes": {"Title": "Inner", "Bedrooms": 3}
        });
        assert_eq!(completeness_score(&value), 1 + 1 + 2);
    }

    #[test]
    fn richer_record_wins_regardless_of_order() {
        let sparse = json!({"id": 7, "Title": "Villa"});
        let rich = json!({
            "id": 7, "Title": "Villa",
            "Amenities": ["Pool"],
            "Image": [{"url": "https://cdn/a.jpg"}]
        });

        for records in [
            vec![raw(sparse.clone()), raw(rich.clone())],
            vec![raw(rich.clone()), raw(sparse.clone())],
        ] {
            let out = deduplicate(&records, None);
            assert_eq!(out.properties.len(), 1);
            assert_eq!(out.duplicates, 1);
            assert_eq!(out.properties[0].amenities.len(), 1);
            assert_eq!(out.properties[0].images.len(), 1);
        }
    }

    #[test]
    fn id_42_index_copy_beats_dump_copy() {
        let records = vec![
            raw_from(RecordSource::CollectionDump, json!({"id": 42, "Title": "X"})),
            raw_from(
                RecordSource::Index,
                json!({"id": 42, "Title": "X", "Bedrooms": 2, "Amenities": ["Pool"]}),
            ),
        ];
        let out = deduplicate(&records, None);
        assert_eq!(out.properties.len(), 1);
        let winner = &out.properties[0];
        assert_eq!(winner.bedrooms, 2);
        assert_eq!(winner.amenities[0].name, "Pool");
        assert_eq!(winner.slug, "x");
    }

    #[test]
    fn ties_keep_first_seen() {
        let records = vec![
            raw(json!({"id": 1, "Title": "First"})),
            raw(json!({"id": 1, "Title": "Second"})),
        ];
        let out = deduplicate(&records, None);
        assert_eq!(out.properties[0].title, "First");
    }

    #[test]
    fn slug_is_regenerated_from_title() {
        let records = vec![raw(json!({"id": 1, "Title": "Modern & Spacious", "slug": "hand-edited"}))];
        let out = deduplicate(&records, None);
        assert_eq!(out.properties[0].slug, "modern-and-spacious");
    }

    #[test]
    fn output_keeps_first_seen_id_order_and_each_id_once() {
        let records = vec![
            raw(json!({"id": 3, "Title": "C"})),
            raw(json!({"id": 1, "Title": "A"})),
            raw(json!({"id": 3, "Title": "C", "Bedrooms": 1})),
            raw(json!({"id": 2, "Title": "B"})),
            raw(json!({"id": 1, "attributes": {"Title": "A"}})),
        ];
        let out = deduplicate(&records, None);
        assert_eq!(ids(&out.properties), vec![3, 1, 2]);
        assert_eq!(out.duplicates, 2);
    }

    #[test]
    fn records_without_id_are_skipped() {
        let records = vec![raw(json!({"Title": "Orphan"})), raw(json!({"id": 1}))];
        let out = deduplicate(&records, None);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.properties.len(), 1);
    }

    #[test]
    fn deduplication_is_deterministic() {
        let records = vec![
            raw(json!({"id": 2, "Title": "3BR Villa in Seminyak", "Amenities": ["Pool"]})),
            raw(json!({"id": 2, "title": "3BR Villa in Seminyak"})),
            raw(json!({"id": 5, "attributes": {"Title": "Loft", "Price": "100"}})),
        ];
        let first = serde_json::to_string(&deduplicate(&records, None).properties).unwrap();
        let second = serde_json::to_string(&deduplicate(&records, None).properties).unwrap();
        assert_eq!(first, second);
    }
}
