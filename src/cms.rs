//! Blocking client for the CMS REST content API.
//!
//! Requests look like:
//!
//! ```text
//! GET /api/<collection>?populate=*&pagination[page]=N&pagination[pageSize]=M
//! Authorization: Bearer <token>
//! ```
//!
//! and responses carry `{ data: [...], meta: { pagination: {...} } }`.
//! Records are returned as raw JSON; shaping them is the normalizer's job.
//! There is no retry or backoff: a failed request is an error for the caller
//! to log.

use crate::config::CmsConfig;
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CMS returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("Unexpected response shape from {0}")]
    Shape(String),
}

/// Pagination block from `meta.pagination`.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Meta {
    pagination: Pagination,
}

/// One page of a collection listing.
#[derive(Debug, Deserialize)]
pub struct CollectionPage {
    pub data: Vec<Value>,
    #[serde(default)]
    meta: Meta,
}

impl CollectionPage {
    pub fn pagination(&self) -> Pagination {
        self.meta.pagination
    }
}

/// Read/write access to CMS collections. The production implementation is
/// [`CmsClient`].
pub trait ContentApi {
    /// Base URL, also used to absolutize root-relative media URLs.
    fn base_url(&self) -> &str;
    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, CmsError>;
    fn ping(&self, collection: &str) -> Result<u64, CmsError>;
    fn update_slug(&self, collection: &str, key: &str, slug: &str) -> Result<(), CmsError>;
}

pub struct CmsClient {
    http: Client,
    base_url: String,
    api_token: String,
    page_size: u32,
}

impl CmsClient {
    pub fn new(config: &CmsConfig) -> Result<Self, CmsError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("listing-export/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            page_size: config.page_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/api/{}", self.base_url, collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_token)
        }
    }

    /// Fetch a single page of a collection with all relations populated.
    pub fn fetch_page(&self, collection: &str, page: u32) -> Result<CollectionPage, CmsError> {
        let url = self.collection_url(collection);
        debug!("GET {url} page={page} pageSize={}", self.page_size);
        let request = self.http.get(&url).query(&[
            ("populate", "*".to_string()),
            ("pagination[page]", page.to_string()),
            ("pagination[pageSize]", self.page_size.to_string()),
        ]);
        let response = check_status(self.authorize(request).send()?, &url)?;
        let body: Value = response.json()?;
        serde_json::from_value(body).map_err(|_| CmsError::Shape(url))
    }

    /// Fetch every record of a collection, walking pages in order.
    pub fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, CmsError> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let result = self.fetch_page(collection, page)?;
            let pagination = result.pagination();
            let received = result.data.len();
            records.extend(result.data);
            debug!(
                "{collection}: page {page}/{} ({received} records)",
                pagination.page_count
            );
            if received == 0 || page >= pagination.page_count {
                break;
            }
            page += 1;
        }
        info!("{collection}: fetched {} records", records.len());
        Ok(records)
    }

    /// Connectivity check: request one record and return the reported total.
    pub fn ping(&self, collection: &str) -> Result<u64, CmsError> {
        let url = self.collection_url(collection);
        let request = self
            .http
            .get(&url)
            .query(&[("pagination[page]", "1"), ("pagination[pageSize]", "1")]);
        let response = check_status(self.authorize(request).send()?, &url)?;
        let body: Value = response.json()?;
        let page: CollectionPage =
            serde_json::from_value(body).map_err(|_| CmsError::Shape(url))?;
        Ok(page.pagination().total.max(page.data.len() as u64))
    }

    /// Write a slug back to one record. `key` is the record's document ID
    /// when the CMS exposes one, otherwise its numeric ID.
    pub fn update_slug(&self, collection: &str, key: &str, slug: &str) -> Result<(), CmsError> {
        let url = format!("{}/{}", self.collection_url(collection), key);
        info!("PUT {url} slug={slug}");
        let request = self.http.put(&url).json(&json!({ "data": { "slug": slug } }));
        check_status(self.authorize(request).send()?, &url)?;
        Ok(())
    }
}

impl ContentApi for CmsClient {
    fn base_url(&self) -> &str {
        CmsClient::base_url(self)
    }

    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, CmsError> {
        CmsClient::fetch_collection(self, collection)
    }

    fn ping(&self, collection: &str) -> Result<u64, CmsError> {
        CmsClient::ping(self, collection)
    }

    fn update_slug(&self, collection: &str, key: &str, slug: &str) -> Result<(), CmsError> {
        CmsClient::update_slug(self, collection, key, slug)
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, CmsError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response
            .text()
            .unwrap_or_else(|_| "(unable to read error body)".to_string());
        return Err(CmsError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(response)
}

/// Key to address a record in write requests: `documentId` when present,
/// otherwise the numeric `id`.
pub fn record_key(raw: &Value) -> Option<String> {
    if let Some(doc) = raw.get("documentId").and_then(Value::as_str)
        && !doc.is_empty()
    {
        return Some(doc.to_string());
    }
    crate::normalize::record_id(raw).map(|id| id.to_string())
}
