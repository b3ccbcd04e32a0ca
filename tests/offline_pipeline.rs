//! End-to-end offline rebuild against a snapshot directory seeded with the
//! overlapping, messy copies a long-running site accumulates.

use listing_export::config::{ExportConfig, OutputConfig};
use listing_export::export::run_rebuild;
use listing_export::snapshot;
use listing_export::sources::INDEX_FILENAME;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config_in(root: &Path) -> ExportConfig {
    ExportConfig {
        output: OutputConfig {
            data_dir: root.join("data"),
            public_dir: root.to_path_buf(),
        },
        ..ExportConfig::default()
    }
}

fn write(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn read(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Dump in the older nested shape, an index with partial copies, and
/// per-ID files, with ID 42 appearing in all three.
fn seed(data: &Path) {
    write(
        &data.join("properties.json"),
        &json!({"data": [
            {"id": 42, "attributes": {"Title": "X"}},
            {"id": 7, "attributes": {
                "Title": "3BR Villa in Seminyak",
                "Description": "Walk to the beach",
                "Price": "450,000",
                "Bedrooms": 3,
                "Bathrooms": 2,
                "Image": {"data": [{"id": 1, "attributes": {"url": "https://cms/uploads/v.jpg"}}]}
            }},
            {"id": 9, "attributes": {"Title": "Modern & Spacious", "publishedAt": null}}
        ]}),
    );
    write(
        &data.join(INDEX_FILENAME),
        &json!([
            {"id": 42, "Title": "X", "Bedrooms": 2, "Amenities": ["Pool"]},
            {"id": 7, "title": "3BR Villa in Seminyak", "slug": "old-villa-slug"},
            {"title": "No id at all"}
        ]),
    );
    write(&data.join("properties-42.json"), &json!({"id": 42, "title": "X"}));
    write(&data.join("properties-13.json"), &json!({"data": {"id": 13, "Name": "Loft"}}));
    write(&data.join("properties/stale-slug.json"), &json!({"id": 99}));
}

#[test]
fn rebuild_yields_one_record_per_id() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    seed(data);

    let report = run_rebuild(&config).unwrap();
    assert_eq!(report.stats.input, 8);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.output, 4);

    let index = read(&data.join(INDEX_FILENAME));
    let ids: Vec<u64> = index
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![42, 7, 9, 13]);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
}

#[test]
fn most_complete_copy_wins() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    seed(data);

    run_rebuild(&config).unwrap();

    let forty_two = read(&data.join("properties-42.json"));
    assert_eq!(forty_two["bedrooms"], 2);
    assert_eq!(forty_two["amenities"][0]["name"], "Pool");

    let villa = read(&data.join("properties/3br-villa-in-seminyak.json"));
    assert_eq!(villa["id"], 7);
    assert_eq!(villa["price"], 450000.0);
    assert_eq!(villa["images"][0]["url"], "https://cms/uploads/v.jpg");

    let draft = read(&data.join("properties/modern-and-spacious.json"));
    assert_eq!(draft["status"], "draft");
}

#[test]
fn stale_slug_files_are_removed() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    seed(data);

    run_rebuild(&config).unwrap();

    assert!(!data.join("properties/stale-slug.json").exists());
    assert!(!data.join("properties/old-villa-slug.json").exists());
    let mut slugs: Vec<String> = fs::read_dir(data.join("properties"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    slugs.sort();
    assert_eq!(
        slugs,
        vec![
            "3br-villa-in-seminyak.json",
            "loft.json",
            "modern-and-spacious.json",
            "x.json"
        ]
    );
}

#[test]
fn rebuild_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    seed(data);

    run_rebuild(&config).unwrap();
    let first = fs::read_to_string(data.join("properties.json")).unwrap();
    let first_index = fs::read_to_string(data.join(INDEX_FILENAME)).unwrap();

    let report = run_rebuild(&config).unwrap();
    assert_eq!(report.stats.output, 4);
    assert_eq!(fs::read_to_string(data.join("properties.json")).unwrap(), first);
    assert_eq!(fs::read_to_string(data.join(INDEX_FILENAME)).unwrap(), first_index);
}

#[test]
fn rebuild_updates_metadata_counts() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    seed(data);

    run_rebuild(&config).unwrap();

    let metadata = snapshot::load_metadata(data).unwrap().unwrap();
    assert_eq!(metadata.collections["properties"], 4);
    assert_eq!(metadata.cms_url, "http://localhost:1337");
}

#[test]
fn malformed_snapshot_aborts_rebuild() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let data = &config.output.data_dir;
    fs::create_dir_all(data).unwrap();
    fs::write(data.join("properties.json"), "{not json").unwrap();

    assert!(run_rebuild(&config).is_err());
    assert!(!data.join(INDEX_FILENAME).exists());
}
