//! Canonical record shapes shared across pipeline stages.
//!
//! Everything the snapshot writer emits and the static site consumes is one
//! of these types. Keys are camelCase because the consumer is JavaScript.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Title used when no source field yields one.
pub const DEFAULT_TITLE: &str = "Untitled Property";

/// A property listing after normalization.
///
/// No field is optional: anything the normalizer cannot resolve carries a
/// type-appropriate default instead of `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub location: String,
    pub property_type: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub area: Area,
    pub images: Vec<ImageRef>,
    pub amenities: Vec<Amenity>,
    pub status: String,
    pub featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Floor area: either a bare number or free text that carries its own unit
/// (`"250 m²"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Area {
    Numeric(f64),
    Text(String),
}

impl Default for Area {
    fn default() -> Self {
        Area::Text(String::new())
    }
}

impl Area {
    pub fn is_empty(&self) -> bool {
        matches!(self, Area::Text(s) if s.is_empty())
    }
}

/// A media reference with its named size variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alternative_text: String,
    /// Variant name (`large`, `medium`, `small`, `thumbnail`) → URL.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub formats: BTreeMap<String, String>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alternative_text: String::new(),
            formats: BTreeMap::new(),
        }
    }

    /// Best URL for a small listing card: `thumbnail`, then `small`, then
    /// the original.
    pub fn thumbnail_url(&self) -> &str {
        self.formats
            .get("thumbnail")
            .or_else(|| self.formats.get("small"))
            .map(String::as_str)
            .unwrap_or(&self.url)
    }
}

/// An amenity. Plain-string amenities become a name with no description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amenity {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Lightweight listing-view entry written to `property-index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub price: f64,
    pub location: String,
    pub property_type: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub featured: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbnail: String,
}

impl From<&Property> for IndexEntry {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            slug: p.slug.clone(),
            title: p.title.clone(),
            price: p.price,
            location: p.location.clone(),
            property_type: p.property_type.clone(),
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            featured: p.featured,
            thumbnail: p
                .images
                .first()
                .map(|img| img.thumbnail_url().to_string())
                .unwrap_or_default(),
        }
    }
}
