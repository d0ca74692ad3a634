//! Harvest orchestration: concurrent dataset fetches feeding the two tables.
//!
//! Each dataset id is one task on a bounded `rayon` pool. Tasks send rows
//! over one channel per table; a dedicated writer drains each channel, so a
//! row is appended whole and no lock is held across network I/O.

use std::collections::HashSet;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::catalogue::{CatalogueClient, SearchFilters};
use crate::config::{catalogue_resource_link, registry_resource_link};
use crate::error::Result;
use crate::http::StatusProbe;
use crate::normalize::{nested_resources, normalize_dataset, normalize_resource};
use crate::progress::ProgressReporter;
use crate::types::{DatasetRecord, InventoryTables, Platform, ResourceRecord};

/// Settings for a harvest run.
#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    /// Platform the catalogue client represents.
    pub platform: Platform,
    /// Worker threads; 0 uses the default parallelism.
    pub workers: usize,
}

impl HarvestOptions {
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Fetches datasets and their resources into [`InventoryTables`].
pub struct Harvester {
    options: HarvestOptions,
    probe: Option<Box<dyn StatusProbe>>,
}

impl Harvester {
    /// Harvester that does not check resource URLs.
    pub fn new(options: HarvestOptions) -> Self {
        Self {
            options,
            probe: None,
        }
    }

    /// Check each resource URL with `probe` while normalizing it.
    pub fn with_probe(mut self, probe: impl StatusProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Harvest the given datasets.
    ///
    /// With `dataset_ids` set, exactly those ids are fetched (an empty list
    /// makes no request). Otherwise the ids are resolved with a dataset
    /// search, filtered on `owner_org` when one is given.
    ///
    /// A dataset that fails to fetch or normalize is logged and left out;
    /// it never aborts its siblings. Requested ids that resolve to the same
    /// dataset (a name and its id) yield one row.
    ///
    /// # Errors
    /// Only id resolution and worker pool construction are fatal.
    pub fn harvest<C>(
        &self,
        client: &C,
        dataset_ids: Option<Vec<String>>,
        owner_org: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<InventoryTables>
    where
        C: CatalogueClient + ?Sized,
    {
        let ids = match (dataset_ids, owner_org) {
            (Some(ids), _) => ids,
            (None, Some(org)) => client.search_dataset_ids(&SearchFilters::owner_org(org))?,
            (None, None) => client.search_dataset_ids(&SearchFilters::new())?,
        };
        let ids = unique_ids(ids);

        tracing::info!(datasets = ids.len(), "Collecting information of all datasets");
        let started = Instant::now();
        progress.start(ids.len());

        if ids.is_empty() {
            progress.finish();
            return Ok(InventoryTables::default());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|index| format!("harvest-{index}"))
            .build()?;

        let (dataset_tx, dataset_rx) = mpsc::channel::<DatasetRecord>();
        let (resource_tx, resource_rx) = mpsc::channel::<ResourceRecord>();
        let collected = Mutex::new(HashSet::with_capacity(ids.len()));

        let mut tables = thread::scope(|scope| {
            let dataset_writer = scope.spawn(move || dataset_rx.into_iter().collect::<Vec<_>>());
            let resource_writer =
                scope.spawn(move || resource_rx.into_iter().collect::<Vec<_>>());

            pool.install(|| {
                ids.par_iter().for_each_with(
                    (dataset_tx, resource_tx),
                    |(datasets, resources), id| {
                        self.collect_dataset(client, id, &collected, datasets, resources);
                        progress.advance();
                    },
                );
            });

            InventoryTables {
                datasets: dataset_writer
                    .join()
                    .unwrap_or_else(|e| std::panic::resume_unwind(e)),
                resources: resource_writer
                    .join()
                    .unwrap_or_else(|e| std::panic::resume_unwind(e)),
            }
        });

        progress.finish();
        tables.sort();

        tracing::info!(
            datasets = tables.datasets.len(),
            resources = tables.resources.len(),
            skipped = ids.len() - tables.datasets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All information was collected"
        );
        Ok(tables)
    }

    /// One task: fetch a dataset, then emit its row and its resources' rows.
    ///
    /// `collected` holds the resolved ids already emitted; a dataset seen
    /// before contributes nothing.
    fn collect_dataset<C>(
        &self,
        client: &C,
        id: &str,
        collected: &Mutex<HashSet<String>>,
        datasets: &Sender<DatasetRecord>,
        resources: &Sender<ResourceRecord>,
    ) where
        C: CatalogueClient + ?Sized,
    {
        let raw = match client.get_dataset(id) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(dataset = %id, error = %e, "Failed to fetch dataset");
                return;
            }
        };

        let record = match normalize_dataset(&raw, &self.options.platform) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(dataset = %id, error = %e, "Skipping malformed dataset");
                return;
            }
        };
        let first_seen = collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone());
        if !first_seen {
            tracing::debug!(dataset = %id, resolved = %record.id, "Dataset already collected");
            return;
        }

        let dataset_id = record.id.clone();
        if datasets.send(record).is_err() {
            return;
        }

        for raw_resource in nested_resources(&raw) {
            match normalize_resource(
                raw_resource,
                &dataset_id,
                &self.options.platform,
                self.probe.as_deref(),
            ) {
                Ok(resource) => {
                    if resources.send(resource).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(dataset = %dataset_id, error = %e, "Dropping malformed resource");
                }
            }
        }
    }
}

impl Harvester {
    /// Fill this harvester's platform columns on rows harvested elsewhere.
    ///
    /// Every dataset in `dataset_ids` (all datasets of `tables` when `None`)
    /// is looked up through `client`. Found datasets get the platform flag,
    /// organization and link; their resources get the platform link.
    /// Datasets the platform does not know are left untouched.
    pub fn update_platform_info<C>(
        &self,
        tables: &mut InventoryTables,
        client: &C,
        dataset_ids: Option<&[String]>,
        progress: &dyn ProgressReporter,
    ) where
        C: CatalogueClient + ?Sized,
    {
        let ids: Vec<String> = match dataset_ids {
            Some(ids) => ids.to_vec(),
            None => tables.datasets.iter().map(|d| d.id.clone()).collect(),
        };
        let platform = &self.options.platform;
        progress.start(ids.len());

        let mut updated = 0usize;
        for id in &ids {
            let found = client
                .get_dataset(id)
                .and_then(|raw| Ok((normalize_dataset(&raw, platform)?, raw)));
            match found {
                Ok((record, raw)) => {
                    let resource_ids: HashSet<&str> = nested_resources(&raw)
                        .iter()
                        .filter_map(|r| r.get("id").and_then(|id| id.as_str()))
                        .collect();
                    if let Some(dataset) = tables.datasets.iter_mut().find(|d| d.id == *id) {
                        copy_platform_columns(dataset, record, platform);
                        updated += 1;
                    }
                    for resource in tables
                        .resources
                        .iter_mut()
                        .filter(|r| r.dataset_id == *id && resource_ids.contains(r.id.as_str()))
                    {
                        set_resource_link(resource, platform);
                    }
                }
                Err(e) => {
                    tracing::debug!(dataset = %id, error = %e, "Dataset not found on platform");
                }
            }
            progress.advance();
        }

        progress.finish();
        tracing::info!(checked = ids.len(), updated, "Platform information updated");
    }
}

fn copy_platform_columns(target: &mut DatasetRecord, source: DatasetRecord, platform: &Platform) {
    match platform {
        Platform::Registry => {
            target.on_registry = true;
            target.org = source.org;
            target.org_title = source.org_title;
            target.registry_link = source.registry_link;
        }
        Platform::Catalogue { .. } => {
            target.on_catalogue = true;
            target.catalogue_org = source.catalogue_org;
            target.catalogue_org_title = source.catalogue_org_title;
            target.catalogue_link = source.catalogue_link;
        }
    }
}

fn set_resource_link(resource: &mut ResourceRecord, platform: &Platform) {
    match platform {
        Platform::Registry => {
            resource.registry_link = Some(registry_resource_link(&resource.dataset_id, &resource.id));
        }
        Platform::Catalogue { site_url } => {
            resource.catalogue_link = Some(catalogue_resource_link(
                site_url,
                &resource.dataset_id,
                &resource.id,
            ));
        }
    }
}

/// Drop repeated ids, keeping the first occurrence.
fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
