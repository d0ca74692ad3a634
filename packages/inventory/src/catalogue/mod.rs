//! Transport-independent access to a CKAN-style catalogue.
//!
//! [`CatalogueClient`] exposes the catalogue operations on top of a single
//! transport primitive, [`CatalogueClient::request_raw`]. Two transports are
//! provided:
//!
//! - [`DirectCatalogueClient`]: rate-limited HTTP through [`crate::http::RetryingHttpClient`]
//! - [`BrowserCatalogueClient`]: a rendered browser session, for portals behind
//!   interactive single sign-on

mod browser;
mod direct;

pub use browser::{extract_embedded_json, BrowserCatalogueClient, PageRenderer};
#[cfg(feature = "browser")]
pub use browser::ChromiumRenderer;
pub use direct::DirectCatalogueClient;

use serde_json::Value;
use url::form_urlencoded::byte_serialize;

use crate::config::SEARCH_PAGE_SIZE;
use crate::error::{InventoryError, Result};
use crate::types::Organizations;

/// Ordered `key:value` filters for `package_search`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    filters: Vec<(String, String)>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on the owning organization id.
    pub fn owner_org(org_id: impl Into<String>) -> Self {
        Self::new().with("owner_org", org_id)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    /// The `fq` expression: `key:value` pairs joined with `+`.
    ///
    /// # Examples
    /// ```
    /// use open_data_inventory::catalogue::SearchFilters;
    ///
    /// let filters = SearchFilters::owner_org("org-1").with("groups", "soil");
    /// assert_eq!(filters.to_query(), "owner_org:org-1+groups:soil");
    /// ```
    pub fn to_query(&self) -> String {
        self.filters
            .iter()
            .map(|(key, value)| format!("{}:{}", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join("+")
    }
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Validate a CKAN response envelope and return its `result`.
///
/// # Errors
/// `InventoryError::Api` when `success` is not `true`,
/// `InventoryError::MalformedResponse` when `result` is absent.
pub fn unwrap_envelope(url: &str, mut envelope: Value) -> Result<Value> {
    if envelope.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(InventoryError::Api {
            url: url.to_string(),
        });
    }
    envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| malformed(url, "missing 'result'"))
}

fn malformed(url: &str, reason: &str) -> InventoryError {
    InventoryError::MalformedResponse {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Dataset and resource access against a CKAN action API.
///
/// Implementors only provide the transport; every catalogue operation is
/// expressed through [`CatalogueClient::request_raw`].
pub trait CatalogueClient: Send + Sync {
    /// Action base URL, ending with `/`.
    fn base_url(&self) -> &str;

    /// Fetch an action URL and return the validated `result` payload.
    fn request_raw(&self, url: &str) -> Result<Value>;

    /// All dataset ids in the catalogue (`package_list`).
    fn list_dataset_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}package_list", self.base_url());
        let result = self.request_raw(&url)?;
        serde_json::from_value(result).map_err(|e| malformed(&url, &e.to_string()))
    }

    /// Ids of datasets matching `filters`, paging through `package_search`.
    ///
    /// Reads the total `count` from a first request, then requests pages of
    /// [`SEARCH_PAGE_SIZE`] rows until that many ids are collected.
    fn search_dataset_ids(&self, filters: &SearchFilters) -> Result<Vec<String>> {
        let fq = filters.to_query();
        let url = format!("{}package_search?fq={fq}", self.base_url());
        let count = self
            .request_raw(&url)?
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed(&url, "missing 'count'"))? as usize;

        let mut ids = Vec::with_capacity(count);
        let mut start = 0;
        while ids.len() < count {
            let url = format!(
                "{}package_search?rows={SEARCH_PAGE_SIZE}&start={start}&fq={fq}",
                self.base_url()
            );
            let page = self.request_raw(&url)?;
            let results = page
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed(&url, "missing 'results'"))?;

            if results.is_empty() {
                tracing::warn!(
                    expected = count,
                    found = ids.len(),
                    "Search ended before reaching the announced count"
                );
                break;
            }

            ids.extend(
                results
                    .iter()
                    .filter_map(|dataset| dataset.get("id").and_then(Value::as_str))
                    .map(str::to_string),
            );
            start += SEARCH_PAGE_SIZE;
        }

        tracing::debug!(count = ids.len(), fq = %fq, "Search complete");
        Ok(ids)
    }

    /// Full `package_show` payload of a dataset, including nested resources.
    fn get_dataset(&self, id: &str) -> Result<Value> {
        let url = format!("{}package_show?id={}", self.base_url(), encode(id));
        self.request_raw(&url)
    }

    /// `resource_show` payload of a single resource.
    fn get_resource(&self, id: &str) -> Result<Value> {
        let url = format!("{}resource_show?id={}", self.base_url(), encode(id));
        self.request_raw(&url)
    }

    /// Organization directory: id to title.
    fn get_organizations(&self) -> Result<Organizations> {
        let url = format!("{}organization_list?all_fields=true", self.base_url());
        let result = self.request_raw(&url)?;
        let organizations = result
            .as_array()
            .ok_or_else(|| malformed(&url, "expected a list of organizations"))?;

        Ok(organizations
            .iter()
            .filter_map(|org| {
                let id = org.get("id")?.as_str()?;
                let title = org.get("title").and_then(Value::as_str).unwrap_or(id);
                Some((id.to_string(), title.to_string()))
            })
            .collect())
    }
}
