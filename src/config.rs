//! Export configuration.
//!
//! One [`ExportConfig`] is built per run and handed to every pipeline stage.
//! Nothing downstream reads the environment on its own.
//!
//! ## Layering
//!
//! ```text
//! stock defaults  ←  listing-export.toml  ←  environment (CMS_URL, CMS_API_TOKEN, STATIC_EXPORT)
//! ```
//!
//! The config file is optional and sparse: it only needs the keys it wants to
//! override. Unknown keys are rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! static_export = false          # Download images and rewrite URLs to local paths
//!
//! [cms]
//! url = "http://localhost:1337"
//! api_token = ""                 # Prefer CMS_API_TOKEN in the environment
//! timeout_secs = 10
//! page_size = 100
//! collections = ["properties"]
//! property_collection = "properties"
//!
//! [output]
//! data_dir = "public/data"
//! public_dir = "public"
//!
//! [images]
//! download_timeout_secs = 30
//! placeholders = ["/images/placeholder-property.jpg"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "listing-export.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level export configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// When true, remote media is downloaded and snapshot URLs point at
    /// local copies. When false, records keep their CMS URLs.
    pub static_export: bool,
    pub cms: CmsConfig,
    pub output: OutputConfig,
    pub images: ImagesConfig,
}

/// Connection settings for the CMS content API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmsConfig {
    /// Base URL of the CMS, without the `/api` suffix.
    pub url: String,
    /// Bearer token. Empty means unauthenticated requests.
    pub api_token: String,
    /// Per-request timeout for API calls.
    pub timeout_secs: u64,
    /// Records requested per page.
    pub page_size: u32,
    /// Every collection to export, in order.
    pub collections: Vec<String>,
    /// The collection holding property listings. Only this one is
    /// normalized, deduplicated and slugged.
    pub property_collection: String,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:1337".to_string(),
            api_token: String::new(),
            timeout_secs: 10,
            page_size: 100,
            collections: vec!["properties".to_string()],
            property_collection: "properties".to_string(),
        }
    }
}

/// Where the snapshot and downloaded media land.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving the JSON snapshot files.
    pub data_dir: PathBuf,
    /// Static web root. Images go under `<public_dir>/property-images/`.
    pub public_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("public/data"),
            public_dir: PathBuf::from("public"),
        }
    }
}

/// Image materialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Per-download timeout.
    pub download_timeout_secs: u64,
    /// Image set substituted for properties with no downloaded media.
    pub placeholders: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 30,
            placeholders: vec!["/images/placeholder-property.jpg".to_string()],
        }
    }
}

impl ExportConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.cms.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation("cms.url must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "cms.url must start with http:// or https://, got {url:?}"
            )));
        }
        if self.cms.page_size == 0 {
            return Err(ConfigError::Validation(
                "cms.page_size must be at least 1".into(),
            ));
        }
        if self.cms.timeout_secs == 0 || self.images.download_timeout_secs == 0 {
            return Err(ConfigError::Validation("timeouts must be non-zero".into()));
        }
        if self.cms.collections.is_empty() {
            return Err(ConfigError::Validation(
                "cms.collections must not be empty".into(),
            ));
        }
        if !self
            .cms
            .collections
            .iter()
            .any(|c| c == &self.cms.property_collection)
        {
            return Err(ConfigError::Validation(format!(
                "cms.property_collection {:?} is not listed in cms.collections",
                self.cms.property_collection
            )));
        }
        if self.images.placeholders.is_empty() {
            return Err(ConfigError::Validation(
                "images.placeholders must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides through an arbitrary lookup.
    ///
    /// Recognised keys: `CMS_URL`, `CMS_API_TOKEN`, `STATIC_EXPORT`.
    /// Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("CMS_URL") {
            self.cms.url = url.trim().to_string();
        }
        if let Some(token) = get("CMS_API_TOKEN") {
            self.cms.api_token = token.trim().to_string();
        }
        if let Some(flag) = get("STATIC_EXPORT") {
            self.static_export = parse_flag(&flag);
        }
    }

    /// Base URL without trailing slash.
    pub fn cms_base_url(&self) -> &str {
        self.cms.url.trim().trim_end_matches('/')
    }

    /// Directory the image materializer writes into.
    pub fn images_root(&self) -> PathBuf {
        self.output.public_dir.join("property-images")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ExportConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from `path` (merged over stock defaults) without consulting
/// the environment. Validates the result.
pub fn load_config(path: &Path) -> Result<ExportConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: ExportConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, then apply environment overrides and validate
/// again. This is what the CLI uses.
pub fn load_config_with_env(path: &Path) -> Result<ExportConfig, ConfigError> {
    let mut config = load_config(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# listing-export configuration
# ============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.
#
# Environment variables override this file:
#   CMS_URL        -> cms.url
#   CMS_API_TOKEN  -> cms.api_token
#   STATIC_EXPORT  -> static_export (true/1/yes/on)

# Download remote images and point snapshot URLs at the local copies.
static_export = false

# ---------------------------------------------------------------------------
# CMS connection
# ---------------------------------------------------------------------------
[cms]
# Base URL of the CMS, without /api.
url = "http://localhost:1337"

# Bearer token for the content API. Leave empty for public collections.
api_token = ""

# Per-request timeout in seconds.
timeout_secs = 10

# Records requested per page.
page_size = 100

# Collections to export. Failing collections are skipped, not fatal.
collections = ["properties"]

# The collection holding property listings.
property_collection = "properties"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Snapshot JSON goes here.
data_dir = "public/data"

# Static web root. Images are written to <public_dir>/property-images/.
public_dir = "public"

# ---------------------------------------------------------------------------
# Images
# ---------------------------------------------------------------------------
[images]
# Per-download timeout in seconds.
download_timeout_secs = 30

# Used for any property that ends up with no downloaded images.
placeholders = ["/images/placeholder-property.jpg"]
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = ExportConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cms.url, "http://localhost:1337");
        assert_eq!(config.cms.collections, vec!["properties"]);
        assert_eq!(config.images.download_timeout_secs, 30);
        assert!(!config.static_export);
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let parsed: ExportConfig = toml::from_str(stock_config_toml()).unwrap();
        let default = ExportConfig::default();
        assert_eq!(parsed.cms.url, default.cms.url);
        assert_eq!(parsed.cms.page_size, default.cms.page_size);
        assert_eq!(parsed.output.data_dir, default.output.data_dir);
        assert_eq!(parsed.images.placeholders, default.images.placeholders);
    }

    #[test]
    fn parse_partial_config() {
        let config: ExportConfig = toml::from_str(
            r#"
[cms]
page_size = 25
"#,
        )
        .unwrap();
        assert_eq!(config.cms.page_size, 25);
        assert_eq!(config.cms.timeout_secs, 10);
        assert_eq!(config.output.public_dir, PathBuf::from("public"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ExportConfig, _> = toml::from_str("[cms]\nurll = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.cms.url, "http://localhost:1337");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"
static_export = true

[cms]
url = "https://cms.example.com/"
collections = ["properties", "testimonials"]
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.static_export);
        assert_eq!(config.cms_base_url(), "https://cms.example.com");
        assert_eq!(config.cms.collections.len(), 2);
        assert_eq!(config.cms.property_collection, "properties");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ExportConfig::default();
        config.cms.url = "ftp://cms".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = ExportConfig::default();
        config.cms.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = ExportConfig::default();
        config.cms.property_collection = "listings".into();
        assert!(config.validate().is_err());

        let mut config = ExportConfig::default();
        config.images.placeholders.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ExportConfig::default();
        config.apply_env_with(env(&[
            ("CMS_URL", "https://cms.example.com"),
            ("CMS_API_TOKEN", " secret "),
            ("STATIC_EXPORT", "yes"),
        ]));
        assert_eq!(config.cms.url, "https://cms.example.com");
        assert_eq!(config.cms.api_token, "secret");
        assert!(config.static_export);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = ExportConfig::default();
        config.apply_env_with(env(&[("CMS_URL", "  "), ("STATIC_EXPORT", "")]));
        assert_eq!(config.cms.url, "http://localhost:1337");
        assert!(!config.static_export);
    }

    #[test]
    fn static_export_flag_parsing() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("maybe"));
    }

    #[test]
    fn merge_toml_nested_override() {
        let base: toml::Value = toml::from_str("[cms]\nurl = \"a\"\npage_size = 1\n").unwrap();
        let overlay: toml::Value = toml::from_str("[cms]\nurl = \"b\"\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["cms"]["url"].as_str(), Some("b"));
        assert_eq!(merged["cms"]["page_size"].as_integer(), Some(1));
    }

    #[test]
    fn images_root_is_under_public_dir() {
        let config = ExportConfig::default();
        assert_eq!(
            config.images_root(),
            PathBuf::from("public").join("property-images")
        );
    }
}
