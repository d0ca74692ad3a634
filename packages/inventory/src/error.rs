//! Error types for the inventory.
//!
//! Uses a single `InventoryError` for library consumers. Transport and
//! protocol failures are surfaced to the caller; the harvester isolates them
//! per dataset.

use thiserror::Error;

/// Main error type for the inventory library.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Base URL could not be parsed or is not an http(s) URL.
    #[error("Invalid base URL: '{0}'. Expected an http(s) URL ending with the CKAN action path")]
    InvalidBaseUrl(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request returned a non-retryable error status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// All retry attempts failed.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// CKAN envelope reported `success: false`.
    #[error("CKAN API error for {url}: request's success is false")]
    Api { url: String },

    /// Response body did not have the expected structure.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Required field absent from a CKAN record.
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// Field present but unusable.
    #[error("Invalid value for field '{field}': {value}")]
    InvalidField { field: String, value: String },

    /// Negative or otherwise unusable duration passed to date arithmetic.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Browser transport failure.
    #[error("Browser error: {0}")]
    Browser(String),

    /// Worker pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InventoryError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InventoryError::Api {
            url: "https://example.org/api/3/action/package_show?id=x".to_string(),
        };
        assert!(err.to_string().contains("success is false"));
        assert!(err.to_string().contains("package_show?id=x"));
    }

    #[test]
    fn test_missing_field_display() {
        let err = InventoryError::missing("title_translated");
        assert_eq!(err.to_string(), "Missing required field 'title_translated'");
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = InventoryError::RetriesExhausted {
            attempts: 3,
            message: "Server error: 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed after 3 attempts: Server error: 503"
        );
    }
}
