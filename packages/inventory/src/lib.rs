//! Open Data Inventory - harvest CKAN catalogues and check dataset compliance.
//!
//! This crate harvests dataset and resource metadata from a CKAN action API
//! into two tables and derives compliance flags (currency, official
//! languages, open formats, data dictionaries) per dataset.
//!
//! # Example
//!
//! ```
//! use open_data_inventory::compliance::complete_missing_fields;
//! use open_data_inventory::types::{DatasetRecord, InventoryTables, ResourceRecord};
//!
//! let mut tables = InventoryTables {
//!     datasets: vec![DatasetRecord {
//!         id: "d1".into(),
//!         frequency: Some("PT1S".into()),
//!         metadata_modified: "2024-01-01T00:00:00".into(),
//!         ..Default::default()
//!     }],
//!     resources: vec![ResourceRecord {
//!         dataset_id: "d1".into(),
//!         format: "CSV".into(),
//!         lang: "eng/fra".into(),
//!         ..Default::default()
//!     }],
//! };
//!
//! complete_missing_fields(&mut tables, chrono::Local::now().naive_local());
//! assert_eq!(tables.datasets[0].up_to_date, Some(true));
//! assert_eq!(tables.datasets[0].open_formats, Some(true));
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration constants, environment and validation
//! - [`types`]: Dataset and resource tables
//! - [`error`]: Error types and Result alias
//! - [`http`]: Rate-limited HTTP client with retries
//! - [`rate_limit`]: Blocking call-rate limiter
//! - [`catalogue`]: CKAN catalogue access, direct or through a browser
//! - [`normalize`]: Raw payloads to table rows
//! - [`harvester`]: Concurrent harvest orchestration
//! - [`dates`]: Timestamps and calendar arithmetic
//! - [`lookup`]: Format and language lookup tables
//! - [`compliance`]: Derived compliance columns
//! - [`progress`]: Progress reporting
//! - [`cli`]: Command-line interface

pub mod catalogue;
pub mod cli;
pub mod compliance;
pub mod config;
pub mod dates;
pub mod error;
pub mod harvester;
pub mod http;
pub mod lookup;
pub mod normalize;
pub mod progress;
pub mod rate_limit;
pub mod types;

// Re-export commonly used items
pub use catalogue::{CatalogueClient, DirectCatalogueClient, SearchFilters};
pub use compliance::complete_missing_fields;
pub use error::{InventoryError, Result};
pub use harvester::{HarvestOptions, Harvester};
pub use http::{RetryingHttpClient, StatusProbe};
pub use types::{DatasetRecord, InventoryTables, Platform, ResourceRecord};
