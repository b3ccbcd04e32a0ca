//! Shared test utilities for the listing-export test suite.
//!
//! Provides raw-record and property builders, a recording [`MockFetcher`]
//! and [`MockCms`] standing in for HTTP, and lookup helpers that panic with a clear message
//! on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let records = vec![raw(json!({"id": 1, "Title": "Villa"}))];
//! let out = deduplicate(&records, None);
//! let villa = find_property(&out.properties, "villa");
//! ```

use crate::cms::{CmsError, ContentApi};
use crate::dedupe::{RawRecord, RecordSource};
use crate::images::{FetchError, MediaFetcher};
use crate::naming::slug_or_fallback;
use crate::types::{Area, ImageRef, Property};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Smallest payload `image::guess_format` recognises as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

// =========================================================================
// Builders
// =========================================================================

/// Raw record as if it came straight from the CMS.
pub fn raw(value: Value) -> RawRecord {
    RawRecord::new(RecordSource::Cms, value)
}

/// Raw record tagged with a specific source.
pub fn raw_from(source: RecordSource, value: Value) -> RawRecord {
    RawRecord::new(source, value)
}

/// Minimal canonical property with the given images.
pub fn property(id: u64, title: &str, images: Vec<ImageRef>) -> Property {
    Property {
        id,
        slug: slug_or_fallback(title, id),
        title: title.to_string(),
        description: String::new(),
        price: 0.0,
        location: String::new(),
        property_type: String::new(),
        bedrooms: 0,
        bathrooms: 0,
        area: Area::default(),
        images,
        amenities: Vec::new(),
        status: "published".to_string(),
        featured: false,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

// =========================================================================
// Mock fetcher
// =========================================================================

/// Serves canned bytes per URL and records every request. Unknown URLs fail
/// with HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn serving(responses: &[(&str, &[u8])]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(url, bytes)| (url.to_string(), bytes.to_vec()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl MediaFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

// =========================================================================
// Mock CMS
// =========================================================================

/// In-memory CMS. Collections not registered fail with HTTP 500, as do slug
/// updates for keys listed in `reject_updates`. Successful updates are
/// recorded as `(collection, key, slug)`.
#[derive(Default)]
pub struct MockCms {
    collections: HashMap<String, Vec<Value>>,
    reject_updates: Vec<String>,
    updates: Mutex<Vec<(String, String, String)>>,
}

impl MockCms {
    pub fn with_collection(mut self, name: &str, records: Vec<Value>) -> Self {
        self.collections.insert(name.to_string(), records);
        self
    }

    pub fn rejecting_update(mut self, key: &str) -> Self {
        self.reject_updates.push(key.to_string());
        self
    }

    pub fn updates(&self) -> Vec<(String, String, String)> {
        self.updates.lock().unwrap().clone()
    }

    fn unavailable(url: String) -> CmsError {
        CmsError::Status {
            status: 500,
            url,
            body: "unavailable".to_string(),
        }
    }
}

impl ContentApi for MockCms {
    fn base_url(&self) -> &str {
        "https://cms.test"
    }

    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, CmsError> {
        self.collections
            .get(collection)
            .cloned()
            .ok_or_else(|| Self::unavailable(format!("/api/{collection}")))
    }

    fn ping(&self, collection: &str) -> Result<u64, CmsError> {
        self.fetch_collection(collection).map(|r| r.len() as u64)
    }

    fn update_slug(&self, collection: &str, key: &str, slug: &str) -> Result<(), CmsError> {
        if self.reject_updates.iter().any(|k| k == key) {
            return Err(Self::unavailable(format!("/api/{collection}/{key}")));
        }
        self.updates.lock().unwrap().push((
            collection.to_string(),
            key.to_string(),
            slug.to_string(),
        ));
        Ok(())
    }
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Find a property by slug. Panics if not found.
pub fn find_property<'a>(properties: &'a [Property], slug: &str) -> &'a Property {
    properties
        .iter()
        .find(|p| p.slug == slug)
        .unwrap_or_else(|| {
            let slugs: Vec<&str> = properties.iter().map(|p| p.slug.as_str()).collect();
            panic!("property '{slug}' not found. Available: {slugs:?}")
        })
}

/// All IDs in order.
pub fn ids(properties: &[Property]) -> Vec<u64> {
    properties.iter().map(|p| p.id).collect()
}
