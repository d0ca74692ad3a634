//! Configuration constants, environment configuration and validation.

use std::time::Duration;

use url::Url;

use crate::error::{InventoryError, Result};

/// Base URL of the Open Government registry CKAN API.
pub const REGISTRY_BASE_URL: &str = "https://open.canada.ca/data/api/3/action/";

/// Public page of a dataset on the registry, `{}` is the dataset id.
pub const REGISTRY_DATASET_LINK: &str = "https://open.canada.ca/data/en/dataset/{}";

/// Public page of a resource on the registry, `{}` are dataset and resource ids.
pub const REGISTRY_RESOURCE_LINK: &str = "https://open.canada.ca/data/en/dataset/{}/resource/{}";

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Calls per second allowed against one catalogue.
pub const DEFAULT_CALLS_PER_SECOND: u32 = 5;

/// Retry attempts for catalogue requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff factor: delays are `factor * 2^(attempt - 1)`.
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Rows requested per `package_search` page.
pub const SEARCH_PAGE_SIZE: usize = 100;

/// Validate and normalize a CKAN action base URL.
///
/// The URL must be http(s). A trailing slash is added when missing so that
/// action names can be appended directly.
///
/// # Examples
/// ```
/// use open_data_inventory::config::validate_base_url;
///
/// assert_eq!(
///     validate_base_url("https://open.canada.ca/data/api/3/action").unwrap(),
///     "https://open.canada.ca/data/api/3/action/"
/// );
/// assert!(validate_base_url("ftp://example.org/").is_err());
/// ```
pub fn validate_base_url(base_url: &str) -> Result<String> {
    let parsed =
        Url::parse(base_url).map_err(|_| InventoryError::InvalidBaseUrl(base_url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(InventoryError::InvalidBaseUrl(base_url.to_string()));
    }

    let mut normalized = base_url.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Site root of a CKAN instance, derived from its action base URL.
///
/// `https://host/data/api/3/action/` becomes `https://host/data`.
pub fn site_root(base_url: &str) -> String {
    base_url
        .split_once("/api/")
        .map_or(base_url, |(root, _)| root)
        .trim_end_matches('/')
        .to_string()
}

/// Registry web page of a dataset.
pub fn registry_dataset_link(dataset_id: &str) -> String {
    REGISTRY_DATASET_LINK.replacen("{}", dataset_id, 1)
}

/// Registry web page of a resource.
pub fn registry_resource_link(dataset_id: &str, resource_id: &str) -> String {
    REGISTRY_RESOURCE_LINK
        .replacen("{}", dataset_id, 1)
        .replacen("{}", resource_id, 1)
}

/// Catalogue web page of a dataset, under the catalogue's site root.
pub fn catalogue_dataset_link(site_url: &str, dataset_id: &str) -> String {
    format!("{}/dataset/{dataset_id}", site_url.trim_end_matches('/'))
}

/// Catalogue web page of a resource, under the catalogue's site root.
pub fn catalogue_resource_link(site_url: &str, dataset_id: &str, resource_id: &str) -> String {
    format!(
        "{}/dataset/{dataset_id}/resource/{resource_id}",
        site_url.trim_end_matches('/')
    )
}

/// Runtime configuration read from the environment.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// CKAN action base URL (with trailing slash).
    pub base_url: String,
    /// Calls per second ceiling for catalogue requests.
    pub calls_per_second: u32,
    /// Worker pool size, 0 for the default parallelism.
    pub workers: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_url: REGISTRY_BASE_URL.to_string(),
            calls_per_second: DEFAULT_CALLS_PER_SECOND,
            workers: 0,
        }
    }
}

impl InventoryConfig {
    /// Read `CKAN_BASE_URL`, `INVENTORY_CALLS_PER_SECOND` and
    /// `INVENTORY_WORKERS`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = match std::env::var("CKAN_BASE_URL") {
            Ok(url) => validate_base_url(&url)?,
            Err(_) => REGISTRY_BASE_URL.to_string(),
        };

        let calls_per_second = std::env::var("INVENTORY_CALLS_PER_SECOND")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &u32| n > 0)
            .unwrap_or(DEFAULT_CALLS_PER_SECOND);

        let workers = std::env::var("INVENTORY_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            base_url,
            calls_per_second,
            workers,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = validate_base_url(base_url)?;
        Ok(self)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}
