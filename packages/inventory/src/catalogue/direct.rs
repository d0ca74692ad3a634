//! Catalogue access over plain HTTP.

use serde_json::Value;

use super::{unwrap_envelope, CatalogueClient};
use crate::config::validate_base_url;
use crate::error::{InventoryError, Result};
use crate::http::RetryingHttpClient;

/// Catalogue client issuing rate-limited, retried GET requests.
#[derive(Debug, Clone)]
pub struct DirectCatalogueClient {
    base_url: String,
    http: RetryingHttpClient,
}

impl DirectCatalogueClient {
    /// Client for `base_url` with the default catalogue HTTP settings.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_http(base_url, RetryingHttpClient::catalogue()?)
    }

    /// Client for `base_url` using the given HTTP client.
    pub fn with_http(base_url: &str, http: RetryingHttpClient) -> Result<Self> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            http,
        })
    }
}

impl CatalogueClient for DirectCatalogueClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_raw(&self, url: &str) -> Result<Value> {
        let body = self.http.get(url).inspect_err(|e| {
            tracing::warn!(url, error = %e, "Catalogue request failed");
        })?;
        let envelope: Value =
            serde_json::from_slice(&body).map_err(|e| InventoryError::MalformedResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        unwrap_envelope(url, envelope)
    }
}
