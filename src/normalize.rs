//! Raw CMS record → canonical [`Property`].
//!
//! Records reach the pipeline in several shapes:
//!
//! - **Nested**: `{ id, attributes: { Title, Price, ... } }` (older API)
//! - **Flat**: `{ id, documentId, Title, Price, ... }`
//! - **Canonical**: a previously exported snapshot record (`title`, `price`)
//!
//! and with inconsistent key casing. Every canonical field has an explicit,
//! ordered chain of [`Accessor`]s. Resolution takes the first accessor that
//! yields a populated value, otherwise the field's type default. Nothing is
//! left `null`.
//!
//! ## Resolution chains
//!
//! ```text
//! title:        Title → title → Name → name → "Untitled Property"
//! description:  Description → description
//! price:        Price → price
//! location:     Location → location → Address → address
//! propertyType: PropertyType → propertyType → property_type → Type → type
//! bedrooms:     Bedrooms → bedrooms
//! bathrooms:    Bathrooms → bathrooms
//! area:         Area → area → Size → size
//! images:       MainImage → Image[0] → images[0] (incl. legacy images.data), then the rest
//! amenities:    Amenities → amenities → Features → features
//! status:       Status → status → publishedAt
//! featured:     Featured → featured → isFeatured
//! ```
//!
//! Normalizing a canonical record returns it unchanged, so snapshots can be
//! fed back through the pipeline.

use crate::naming::slug_or_fallback;
use crate::types::{Amenity, Area, DEFAULT_TITLE, ImageRef, Property};
use serde_json::{Map, Value};

/// One place a field may live in a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// A top-level key.
    Key(&'static str),
    /// A path of nested keys.
    Path(&'static [&'static str]),
}

impl Accessor {
    pub fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match self {
            Accessor::Key(key) => record.get(*key),
            Accessor::Path(path) => path.iter().try_fold(record, |v, key| v.get(*key)),
        }
    }
}

use Accessor::Key;

pub const TITLE: &[Accessor] = &[Key("Title"), Key("title"), Key("Name"), Key("name")];
pub const DESCRIPTION: &[Accessor] = &[Key("Description"), Key("description")];
pub const PRICE: &[Accessor] = &[Key("Price"), Key("price")];
pub const LOCATION: &[Accessor] = &[
    Key("Location"),
    Key("location"),
    Key("Address"),
    Key("address"),
];
pub const PROPERTY_TYPE: &[Accessor] = &[
    Key("PropertyType"),
    Key("propertyType"),
    Key("property_type"),
    Key("Type"),
    Key("type"),
];
pub const BEDROOMS: &[Accessor] = &[Key("Bedrooms"), Key("bedrooms")];
pub const BATHROOMS: &[Accessor] = &[Key("Bathrooms"), Key("bathrooms")];
pub const AREA: &[Accessor] = &[Key("Area"), Key("area"), Key("Size"), Key("size")];
pub const AMENITIES: &[Accessor] = &[
    Key("Amenities"),
    Key("amenities"),
    Key("Features"),
    Key("features"),
];
pub const STATUS: &[Accessor] = &[Key("Status"), Key("status")];
pub const FEATURED: &[Accessor] = &[Key("Featured"), Key("featured"), Key("isFeatured")];
pub const CREATED_AT: &[Accessor] = &[Key("createdAt"), Key("created_at"), Key("CreatedAt")];
pub const UPDATED_AT: &[Accessor] = &[Key("updatedAt"), Key("updated_at"), Key("UpdatedAt")];
pub const SLUG: &[Accessor] = &[Key("slug"), Key("Slug")];

/// Single-image locations, highest priority first.
pub const MAIN_IMAGE: &[Accessor] = &[Key("MainImage"), Key("mainImage"), Key("main_image")];
/// Gallery locations, highest priority first. Legacy `images.data` is
/// handled by [`media_items`].
pub const GALLERY: &[Accessor] = &[Key("Image"), Key("image"), Key("Images"), Key("images")];

const ID: &[Accessor] = &[Key("id"), Key("Id"), Key("ID")];
const NAME_KEYS: &[Accessor] = &[Key("name"), Key("Name"), Key("title"), Key("Title")];
const NAME_DESCRIPTION: &[Accessor] = &[Key("description"), Key("Description")];

/// Whether a value counts as "populated": not null, not an empty or
/// whitespace-only string, not an empty list or object.
pub fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// First populated value along a chain.
pub fn resolve<'a>(record: &'a Value, chain: &[Accessor]) -> Option<&'a Value> {
    chain
        .iter()
        .filter_map(|accessor| accessor.lookup(record))
        .find(|v| is_populated(v))
}

/// Lift a nested `attributes` object to the top level, keeping the outer
/// `id`/`documentId`. Flat records are returned as-is.
pub fn flatten(raw: &Value) -> Value {
    let Some(attributes) = raw.get("attributes").and_then(Value::as_object) else {
        return raw.clone();
    };
    let mut flat: Map<String, Value> = attributes.clone();
    if let Some(outer) = raw.as_object() {
        for (key, value) in outer {
            if key != "attributes" {
                flat.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(flat)
}

/// Numeric record ID from `id`/`Id`/`ID`, accepting numeric strings.
pub fn record_id(raw: &Value) -> Option<u64> {
    let value = resolve(raw, ID)?;
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Slug stored on the raw record, if any.
pub fn existing_slug(raw: &Value) -> Option<String> {
    resolve(&flatten(raw), SLUG)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

/// Normalize a raw record. Returns `None` only when no numeric ID exists.
///
/// `media_base` is prepended to root-relative media URLs (`/uploads/x.jpg`).
/// Pass `None` when re-normalizing snapshot records whose URLs are already
/// final.
pub fn normalize(raw: &Value, media_base: Option<&str>) -> Option<Property> {
    let record = flatten(raw);
    let id = record_id(&record)?;
    let title = text(&record, TITLE).unwrap_or_else(|| DEFAULT_TITLE.to_string());

    Some(Property {
        id,
        slug: slug_or_fallback(&title, id),
        description: text(&record, DESCRIPTION).unwrap_or_default(),
        price: number(&record, PRICE).unwrap_or(0.0),
        location: text(&record, LOCATION).unwrap_or_default(),
        property_type: text(&record, PROPERTY_TYPE).unwrap_or_default(),
        bedrooms: count(&record, BEDROOMS),
        bathrooms: count(&record, BATHROOMS),
        area: area(&record),
        images: images(&record, media_base),
        amenities: amenities(&record),
        status: status(&record),
        featured: flag(&record, FEATURED),
        created_at: text(&record, CREATED_AT).unwrap_or_default(),
        updated_at: text(&record, UPDATED_AT).unwrap_or_default(),
        title,
    })
}

// =============================================================================
// Scalar extraction
// =============================================================================

/// Text from the first accessor that yields something printable. Relation
/// objects (`{data: {attributes: {name}}}`) resolve to their name.
pub fn text(record: &Value, chain: &[Accessor]) -> Option<String> {
    chain
        .iter()
        .filter_map(|accessor| accessor.lookup(record))
        .filter_map(as_text)
        .find(|s| !s.is_empty())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => {
            let inner = unwrap_relation(value)?;
            resolve(inner, NAME_KEYS).and_then(as_text)
        }
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

fn number(record: &Value, chain: &[Accessor]) -> Option<f64> {
    chain
        .iter()
        .filter_map(|accessor| accessor.lookup(record))
        .find_map(parse_number)
}

fn count(record: &Value, chain: &[Accessor]) -> u32 {
    number(record, chain)
        .filter(|n| n.is_finite() && *n > 0.0)
        .map(|n| n.round().min(u32::MAX as f64) as u32)
        .unwrap_or(0)
}

fn flag(record: &Value, chain: &[Accessor]) -> bool {
    match resolve(record, chain) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn area(record: &Value) -> Area {
    match resolve(record, AREA) {
        Some(Value::Number(n)) => n.as_f64().map(Area::Numeric).unwrap_or_default(),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(n) => Area::Numeric(n),
                Err(_) => Area::Text(s.to_string()),
            }
        }
        _ => Area::default(),
    }
}

fn status(record: &Value) -> String {
    if let Some(s) = text(record, STATUS) {
        return s.to_lowercase();
    }
    match record.get("publishedAt") {
        Some(Value::Null) => "draft".to_string(),
        _ => "published".to_string(),
    }
}

// =============================================================================
// Media
// =============================================================================

/// Strip relation wrappers: `{data: X}` → X, `{attributes: Y}` → Y (merged
/// with the outer `id`). Returns `None` for `{data: null}`.
fn unwrap_relation(value: &Value) -> Option<&Value> {
    let mut current = value;
    loop {
        if let Some(data) = current.get("data") {
            if data.is_null() {
                return None;
            }
            current = data;
            continue;
        }
        if let Some(attributes) = current.get("attributes").filter(|a| a.is_object()) {
            current = attributes;
            continue;
        }
        return Some(current);
    }
}

/// Individual media objects at a location: a list, a `{data: [...]}`
/// relation, or a single object.
fn media_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => match value.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Null) => Vec::new(),
            _ => vec![value],
        },
        _ => Vec::new(),
    }
}

/// Turn root-relative and protocol-relative URLs into absolute ones.
pub fn absolutize(url: &str, media_base: Option<&str>) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{rest}");
    }
    match media_base {
        Some(base) if url.starts_with('/') => {
            format!("{}{}", base.trim_end_matches('/'), url)
        }
        _ => url.to_string(),
    }
}

fn image_ref(value: &Value, media_base: Option<&str>) -> Option<ImageRef> {
    let media = match value {
        Value::String(url) => return Some(ImageRef::new(absolutize(url.trim(), media_base))),
        other => unwrap_relation(other)?,
    };
    let url = media.get("url").and_then(Value::as_str)?.trim();
    if url.is_empty() {
        return None;
    }
    let mut image = ImageRef::new(absolutize(url, media_base));
    image.alternative_text = text(media, &[Key("alternativeText"), Key("alt")]).unwrap_or_default();
    if let Some(formats) = media.get("formats").and_then(Value::as_object) {
        for (variant, format) in formats {
            let variant_url = match format {
                Value::String(s) => Some(s.as_str()),
                other => other.get("url").and_then(Value::as_str),
            };
            if let Some(u) = variant_url.filter(|u| !u.trim().is_empty()) {
                image
                    .formats
                    .insert(variant.clone(), absolutize(u.trim(), media_base));
            }
        }
    }
    Some(image)
}

/// Main image first, then the rest of the gallery, without repeats.
fn images(record: &Value, media_base: Option<&str>) -> Vec<ImageRef> {
    let main = resolve(record, MAIN_IMAGE)
        .into_iter()
        .flat_map(media_items)
        .next();
    let gallery = GALLERY
        .iter()
        .filter_map(|accessor| accessor.lookup(record))
        .map(media_items)
        .find(|items| !items.is_empty())
        .unwrap_or_default();

    let mut result: Vec<ImageRef> = Vec::new();
    for candidate in main.into_iter().chain(gallery) {
        if let Some(image) = image_ref(candidate, media_base)
            && !result.iter().any(|existing| existing.url == image.url)
        {
            result.push(image);
        }
    }
    result
}

// =============================================================================
// Amenities
// =============================================================================

/// Structured when the first element is an object with a name-like key,
/// plain strings otherwise.
fn amenities(record: &Value) -> Vec<Amenity> {
    let Some(list) = resolve(record, AMENITIES) else {
        return Vec::new();
    };
    let items = media_items(list);
    let structured = items
        .first()
        .and_then(|first| unwrap_relation(first))
        .is_some_and(|first| first.is_object() && resolve(first, NAME_KEYS).is_some());

    items
        .into_iter()
        .filter_map(|item| {
            if structured {
                let inner = unwrap_relation(item)?;
                Some(Amenity {
                    name: text(inner, NAME_KEYS)?,
                    description: text(inner, NAME_DESCRIPTION).unwrap_or_default(),
                })
            } else {
                let name = item.as_str()?.trim();
                (!name.is_empty()).then(|| Amenity {
                    name: name.to_string(),
                    description: String::new(),
                })
            }
        })
        .collect()
}
