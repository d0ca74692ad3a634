//! Core data types: the dataset and resource tables.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Organization directory: organization id to display title.
pub type Organizations = BTreeMap<String, String>;

/// Platform a catalogue client represents.
///
/// Decides which provenance flag, organization columns and links a harvested
/// row is filled with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Platform {
    /// The public Open Government registry.
    #[default]
    Registry,

    /// A departmental open data catalogue served under `site_url`.
    Catalogue { site_url: String },
}

/// One harvested dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub title_en: String,
    pub title_fr: String,
    /// Publication date, ISO-8601.
    pub published: Option<String>,
    /// Effective last modification, inferred from the dataset and its resources.
    pub modified: Option<NaiveDateTime>,
    pub metadata_created: String,
    pub metadata_modified: String,
    pub num_resources: usize,

    pub on_registry: bool,
    pub on_catalogue: bool,
    pub org: Option<String>,
    pub org_title: Option<String>,
    pub catalogue_org: Option<String>,
    pub catalogue_org_title: Option<String>,

    pub maintainer_email: Option<String>,
    pub maintainer_name: String,
    pub collection: Option<String>,
    /// ISO-8601 duration token, e.g. `P1M`.
    pub frequency: Option<String>,
    /// Authoritative source is another system.
    pub harvested: bool,
    pub internal: bool,

    pub up_to_date: Option<bool>,
    pub official_lang: Option<bool>,
    pub open_formats: Option<bool>,
    pub spec: Option<bool>,

    pub registry_link: Option<String>,
    pub catalogue_link: Option<String>,
}

/// One harvested resource, keyed to its dataset by `dataset_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub title_en: String,
    pub title_fr: String,
    pub created: String,
    pub metadata_modified: String,
    pub last_modified: String,
    pub format: String,
    /// ISO 639-2 codes joined with `/`.
    pub lang: String,
    pub dataset_id: String,
    pub resource_type: String,
    pub url: String,
    /// HTTP status of `url`, [`ResourceRecord::URL_NOT_CHECKED`] when not evaluated.
    pub url_status: i32,
    pub https: bool,
    pub registry_link: Option<String>,
    pub catalogue_link: Option<String>,
}

impl ResourceRecord {
    /// `url_status` of a link that was not checked.
    pub const URL_NOT_CHECKED: i32 = -1;
}

impl Default for ResourceRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            title_en: String::new(),
            title_fr: String::new(),
            created: String::new(),
            metadata_modified: String::new(),
            last_modified: String::new(),
            format: String::new(),
            lang: String::new(),
            dataset_id: String::new(),
            resource_type: String::new(),
            url: String::new(),
            url_status: Self::URL_NOT_CHECKED,
            https: false,
            registry_link: None,
            catalogue_link: None,
        }
    }
}

/// The pair of tables produced by a harvest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryTables {
    pub datasets: Vec<DatasetRecord>,
    pub resources: Vec<ResourceRecord>,
}

impl InventoryTables {
    /// Sort datasets by id and resources by dataset id.
    ///
    /// The resource sort is stable, so resources of one dataset keep their
    /// relative order.
    pub fn sort(&mut self) {
        self.datasets.sort_by(|a, b| a.id.cmp(&b.id));
        self.resources.sort_by(|a, b| a.dataset_id.cmp(&b.dataset_id));
    }
}
