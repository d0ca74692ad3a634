//! Compliance pass over harvested tables.
//!
//! Every rule is a pure function of one dataset row and the resources joined
//! to it on `dataset_id`. [`complete_missing_fields`] runs them in a fixed
//! order once harvesting has finished.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::dates::{date_ago, parse_frequency, parse_timestamp, Cadence};
use crate::lookup::format_info;
use crate::types::{DatasetRecord, InventoryTables, ResourceRecord};

/// Titles that identify a data dictionary or specification resource.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SPEC_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(data dictionary|specification|^dd[_-]|[_-]dd([^a-z0-9]|$))")
        .expect("valid regex")
});

/// Resource type of the data files themselves.
const DATASET_RESOURCE_TYPE: &str = "dataset";

/// Resource date columns, in the order they are consulted.
const DATE_COLUMNS: [fn(&ResourceRecord) -> &str; 3] = [last_modified, metadata_modified, created];

fn last_modified(resource: &ResourceRecord) -> &str {
    &resource.last_modified
}

fn metadata_modified(resource: &ResourceRecord) -> &str {
    &resource.metadata_modified
}

fn created(resource: &ResourceRecord) -> &str {
    &resource.created
}

/// Last modification of a dataset.
///
/// The maximum of the dataset's own `metadata_modified` and the resources'
/// timestamps from the first of `last_modified`, `metadata_modified`,
/// `created` that any resource fills. Columns are never mixed. Falls back to
/// `now` when nothing parses.
pub fn infer_modified(
    dataset: &DatasetRecord,
    resources: &[&ResourceRecord],
    now: NaiveDateTime,
) -> NaiveDateTime {
    let resource_dates = DATE_COLUMNS
        .iter()
        .find(|column| resources.iter().any(|r| !column(*r).trim().is_empty()))
        .map(|column| {
            resources
                .iter()
                .filter_map(|r| parse_timestamp(column(*r)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    parse_timestamp(&dataset.metadata_modified)
        .into_iter()
        .chain(resource_dates)
        .max()
        .unwrap_or(now)
}

/// Whether the dataset was modified within its declared update cadence.
///
/// Harvested datasets and datasets without a readable cadence are always up
/// to date. Uses `dataset.modified`, falling back to `metadata_modified`.
pub fn get_up_to_date(dataset: &DatasetRecord, now: NaiveDateTime) -> bool {
    if dataset.harvested {
        return true;
    }

    let cadence = dataset
        .frequency
        .as_deref()
        .map_or(Cadence::Unscheduled, parse_frequency);
    let Cadence::Every { n, unit } = cadence else {
        return true;
    };

    let oldest_valid = match date_ago(n, unit, now) {
        Ok(date) => date,
        Err(e) => {
            tracing::debug!(dataset = %dataset.id, error = %e, "Unusable frequency");
            return true;
        }
    };

    let Some(modified) = dataset
        .modified
        .or_else(|| parse_timestamp(&dataset.metadata_modified))
    else {
        return true;
    };
    modified >= oldest_valid
}

/// As many English resources as French ones.
pub fn get_official_lang(resources: &[&ResourceRecord]) -> bool {
    let english = resources.iter().filter(|r| r.lang.contains("eng")).count();
    let french = resources.iter().filter(|r| r.lang.contains("fra")).count();
    english == french
}

/// Every format category present offers at least one open format.
///
/// Formats missing from the lookup table are not counted.
pub fn get_open_formats(resources: &[&ResourceRecord]) -> bool {
    let mut categories: HashMap<&str, bool> = HashMap::new();
    for info in resources.iter().filter_map(|r| format_info(&r.format)) {
        *categories.entry(info.category).or_default() |= info.open;
    }
    categories.values().all(|&open| open)
}

/// Datasets that publish data files also publish a data dictionary or
/// specification, matched on the English resource title.
pub fn get_spec(resources: &[&ResourceRecord]) -> bool {
    if !resources
        .iter()
        .any(|r| r.resource_type == DATASET_RESOURCE_TYPE)
    {
        return true;
    }
    resources.iter().any(|r| SPEC_TITLE.is_match(&r.title_en))
}

/// Fill `modified`, `up_to_date`, `official_lang`, `open_formats` and `spec`
/// for every dataset, in that order.
pub fn complete_missing_fields(tables: &mut InventoryTables, now: NaiveDateTime) {
    let mut by_dataset: HashMap<&str, Vec<&ResourceRecord>> = HashMap::new();
    for resource in &tables.resources {
        by_dataset
            .entry(resource.dataset_id.as_str())
            .or_default()
            .push(resource);
    }

    tracing::info!(datasets = tables.datasets.len(), "Completing compliance fields");

    let mut seen = HashSet::new();
    for dataset in &mut tables.datasets {
        if !seen.insert(dataset.id.clone()) {
            tracing::warn!(dataset = %dataset.id, "Duplicate dataset id in table");
        }
        let resources = by_dataset
            .get(dataset.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        dataset.modified = Some(infer_modified(dataset, resources, now));
        dataset.up_to_date = Some(get_up_to_date(dataset, now));
        dataset.official_lang = Some(get_official_lang(resources));
        dataset.open_formats = Some(get_open_formats(resources));
        dataset.spec = Some(get_spec(resources));
    }
}
