//! Harvest orchestration tests against in-memory and mocked catalogues.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use open_data_inventory::catalogue::{
    BrowserCatalogueClient, CatalogueClient, DirectCatalogueClient, PageRenderer,
};
use open_data_inventory::compliance::complete_missing_fields;
use open_data_inventory::harvester::{HarvestOptions, Harvester};
use open_data_inventory::http::{HttpConfig, RetryingHttpClient, StatusProbe};
use open_data_inventory::progress::{ProgressCounter, SilentProgress};
use open_data_inventory::types::{Platform, ResourceRecord};
use open_data_inventory::{InventoryError, Result};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory catalogue serving `package_show` payloads by id and
/// `package_search` over every payload.
#[derive(Default)]
struct MemoryCatalogue {
    datasets: HashMap<String, Value>,
    listed: Vec<String>,
    requests: AtomicUsize,
    searches: Mutex<Vec<String>>,
}

impl MemoryCatalogue {
    fn with_datasets(payloads: impl IntoIterator<Item = Value>) -> Self {
        let datasets: HashMap<String, Value> = payloads
            .into_iter()
            .map(|p| (p["id"].as_str().unwrap_or_default().to_string(), p))
            .collect();
        let mut listed: Vec<String> = datasets.keys().cloned().collect();
        listed.sort();
        Self {
            datasets,
            listed,
            ..Default::default()
        }
    }

    /// Also serve the payload of `id` under `key`, as CKAN does for names.
    fn with_alias(mut self, key: &str, id: &str) -> Self {
        if let Some(payload) = self.datasets.get(id).cloned() {
            self.datasets.insert(key.to_string(), payload);
        }
        self
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl CatalogueClient for MemoryCatalogue {
    fn base_url(&self) -> &str {
        "https://memory.test/api/3/action/"
    }

    fn request_raw(&self, url: &str) -> Result<Value> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if url.contains("package_search") {
            self.searches.lock().unwrap().push(url.to_string());
            let results: Vec<Value> = if url.contains("rows=") {
                self.listed.iter().map(|id| json!({"id": id})).collect()
            } else {
                Vec::new()
            };
            return Ok(json!({"count": self.listed.len(), "results": results}));
        }
        let id = url.rsplit_once("id=").map(|(_, id)| id).unwrap_or_default();
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| InventoryError::Api {
                url: url.to_string(),
            })
    }
}

/// Probe answering a fixed status and remembering what it was asked.
struct RecordingProbe {
    status: i32,
    urls: Mutex<Vec<String>>,
}

impl StatusProbe for RecordingProbe {
    fn status_code(&self, url: &str) -> Result<i32> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(self.status)
    }
}

fn dataset(id: &str, frequency: &str, resources: Value) -> Value {
    json!({
        "id": id,
        "title_translated": {"en": format!("Dataset {id}"), "fr": format!("Jeu {id}")},
        "organization": {"name": "aafc-aac", "title": "Agriculture and Agri-Food Canada | Agriculture et Agroalimentaire Canada"},
        "metadata_created": "2019-01-01T00:00:00.000000",
        "metadata_modified": "2019-06-01T00:00:00.000000",
        "maintainer_email": "Jane.MacDonald@agr.gc.ca",
        "frequency": frequency,
        "resources": resources,
    })
}

fn csv_resource(id: &str, dataset_id: &str, last_modified: &str) -> Value {
    json!({
        "id": id,
        "package_id": dataset_id,
        "name": format!("Resource {id}"),
        "name_translated": {"en": format!("Resource {id}"), "fr": format!("Ressource {id}")},
        "created": "2019-01-01T00:00:00",
        "metadata_modified": "2019-06-01T00:00:00",
        "last_modified": last_modified,
        "format": "CSV",
        "language": ["en", "fr"],
        "resource_type": "dataset",
        "url": format!("https://data.test/{dataset_id}/{id}.csv"),
    })
}

fn timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[test]
fn test_zero_ids_makes_no_calls() {
    let catalogue = MemoryCatalogue::default();
    let counter = ProgressCounter::new();

    let tables = Harvester::new(HarvestOptions::default())
        .harvest(&catalogue, Some(Vec::new()), Some("aafc-aac"), &counter)
        .unwrap();

    assert!(tables.datasets.is_empty());
    assert!(tables.resources.is_empty());
    assert_eq!(catalogue.requests(), 0);
    assert_eq!(counter.total(), 0);
}

#[test]
fn test_protocol_failure_is_isolated() {
    let catalogue = MemoryCatalogue::with_datasets([
        dataset("d1", "P1Y", json!([csv_resource("r1", "d1", "")])),
        dataset("d3", "P1Y", json!([])),
    ]);
    let counter = ProgressCounter::new();

    let ids = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];
    let tables = Harvester::new(HarvestOptions::default())
        .harvest(&catalogue, Some(ids), None, &counter)
        .unwrap();

    let ids: Vec<_> = tables.datasets.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d3"]);
    assert_eq!(tables.resources.len(), 1);
    assert_eq!(counter.completed(), 3);
}

#[test]
fn test_malformed_dataset_drops_its_resources() {
    let mut broken = dataset("d2", "P1M", json!([csv_resource("r2", "d2", "")]));
    broken["organization"] = Value::Null;
    let catalogue = MemoryCatalogue::with_datasets([
        dataset("d1", "P1M", json!([csv_resource("r1", "d1", ""), "not a resource"])),
        broken,
    ]);

    let tables = Harvester::new(HarvestOptions::default())
        .harvest(
            &catalogue,
            Some(vec!["d1".into(), "d2".into()]),
            None,
            &SilentProgress,
        )
        .unwrap();

    assert_eq!(tables.datasets.len(), 1);
    let resource_ids: Vec<_> = tables.resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(resource_ids, vec!["r1"]);
}

#[test]
fn test_concurrent_harvest_keeps_every_row() {
    let payloads: Vec<Value> = (0..500)
        .map(|i| {
            let id = format!("ds-{i:03}");
            let resources = json!([
                csv_resource(&format!("{id}-a"), &id, ""),
                csv_resource(&format!("{id}-b"), &id, ""),
            ]);
            dataset(&id, "P1Y", resources)
        })
        .collect();
    let catalogue = MemoryCatalogue::with_datasets(payloads);
    let ids: Vec<String> = catalogue.listed.clone();

    for workers in [0, 1, 8, 32] {
        let counter = ProgressCounter::new();
        let tables = Harvester::new(HarvestOptions::default().with_workers(workers))
            .harvest(&catalogue, Some(ids.clone()), None, &counter)
            .unwrap();

        assert_eq!(tables.datasets.len(), 500);
        assert_eq!(tables.resources.len(), 1000);
        let unique: HashSet<_> = tables.datasets.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(unique.len(), 500);
        let unique: HashSet<_> = tables.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), 1000);
        assert_eq!(counter.completed(), 500);

        // Sorted by id, resources grouped by dataset
        assert!(tables.datasets.windows(2).all(|w| w[0].id < w[1].id));
        assert!(tables
            .resources
            .windows(2)
            .all(|w| w[0].dataset_id <= w[1].dataset_id));
    }
}

#[test]
fn test_without_ids_searches_catalogue() {
    let catalogue = MemoryCatalogue::with_datasets([
        dataset("b", "P1Y", json!([])),
        dataset("a", "P1Y", json!([])),
    ]);

    let tables = Harvester::new(HarvestOptions::default())
        .harvest(&catalogue, None, None, &SilentProgress)
        .unwrap();

    assert_eq!(tables.datasets.len(), 2);
    assert_eq!(tables.datasets[0].id, "a");
    // Count request and one page, then one package_show per dataset
    assert_eq!(catalogue.requests(), 4);
    let searches = catalogue.searches.lock().unwrap();
    assert_eq!(
        *searches,
        vec![
            "https://memory.test/api/3/action/package_search?fq=",
            "https://memory.test/api/3/action/package_search?rows=100&start=0&fq=",
        ]
    );
}

#[test]
fn test_name_and_id_of_one_dataset_yield_one_row() {
    let catalogue = MemoryCatalogue::with_datasets([dataset(
        "uuid-1",
        "P1Y",
        json!([csv_resource("r1", "uuid-1", "")]),
    )])
    .with_alias("my-dataset", "uuid-1");

    for workers in [1, 4] {
        let tables = Harvester::new(HarvestOptions::default().with_workers(workers))
            .harvest(
                &catalogue,
                Some(vec!["my-dataset".into(), "uuid-1".into()]),
                None,
                &SilentProgress,
            )
            .unwrap();

        assert_eq!(tables.datasets.len(), 1);
        assert_eq!(tables.datasets[0].id, "uuid-1");
        assert_eq!(tables.resources.len(), 1);
        assert_eq!(tables.resources[0].id, "r1");
    }
}

/// Browser session that fails when two navigations overlap.
struct ExclusiveSession {
    in_flight: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    visits: Vec<String>,
    datasets: HashMap<String, Value>,
}

impl PageRenderer for ExclusiveSession {
    fn render(&mut self, url: &str) -> Result<String> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            return Err(InventoryError::Browser("navigation already in flight".into()));
        }
        thread::sleep(Duration::from_millis(1));
        self.visits.push(url.to_string());

        let page = if self.visits.len() % 2 == 1 {
            "<html><body>Signing you in...</body></html>".to_string()
        } else {
            let id = url.rsplit_once("id=").map(|(_, id)| id).unwrap_or_default();
            let envelope = match self.datasets.get(id) {
                Some(payload) => json!({"success": true, "result": payload}),
                None => json!({"success": false}),
            };
            format!(r#"<html><body><div hidden="true">{envelope}</div></body></html>"#)
        };

        self.in_flight.store(false, Ordering::SeqCst);
        Ok(page)
    }
}

#[test]
fn test_browser_session_is_serialized_across_workers() {
    let ids: Vec<String> = (0..20).map(|i| format!("d{i:02}")).collect();
    let datasets: HashMap<String, Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let resources = json!([csv_resource(&format!("r{i:02}"), id, "")]);
            (id.clone(), dataset(id, "P1Y", resources))
        })
        .collect();
    let overlaps = Arc::new(AtomicUsize::new(0));
    let session = ExclusiveSession {
        in_flight: Arc::new(AtomicBool::new(false)),
        overlaps: Arc::clone(&overlaps),
        visits: Vec::new(),
        datasets,
    };
    let client =
        BrowserCatalogueClient::new("https://catalogue.test/api/3/action/", session).unwrap();

    let tables = Harvester::new(HarvestOptions::default().with_workers(8))
        .harvest(&client, Some(ids.clone()), None, &SilentProgress)
        .unwrap();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(tables.datasets.len(), 20);
    assert_eq!(tables.resources.len(), 20);

    // Both navigations of one request are adjacent
    let session = client.into_renderer();
    assert_eq!(session.visits.len(), 40);
    assert!(session.visits.chunks(2).all(|pair| pair[0] == pair[1]));
    let visited: HashSet<&str> = session
        .visits
        .iter()
        .filter_map(|url| url.rsplit_once("id=").map(|(_, id)| id))
        .collect();
    assert_eq!(visited.len(), 20);
}

#[test]
fn test_probe_checks_valid_urls_only() {
    let mut resources = vec![
        csv_resource("r1", "d1", ""),
        csv_resource("r2", "d1", ""),
    ];
    resources[1]["url"] = json!("not a url");
    let catalogue = MemoryCatalogue::with_datasets([dataset("d1", "P1Y", json!(resources))]);

    let tables = Harvester::new(HarvestOptions::default())
        .with_probe(RecordingProbe {
            status: 200,
            urls: Mutex::new(Vec::new()),
        })
        .harvest(&catalogue, Some(vec!["d1".into()]), None, &SilentProgress)
        .unwrap();

    let statuses: Vec<_> = tables.resources.iter().map(|r| r.url_status).collect();
    assert_eq!(statuses, vec![200, ResourceRecord::URL_NOT_CHECKED]);
    assert!(tables.resources[0].https);
    assert!(!tables.resources[1].https);
}

#[test]
fn test_catalogue_platform_columns() {
    let catalogue =
        MemoryCatalogue::with_datasets([dataset("d1", "P1Y", json!([csv_resource("r1", "d1", "")]))]);
    let options = HarvestOptions::default().with_platform(Platform::Catalogue {
        site_url: "https://catalogue.test/".into(),
    });

    let tables = Harvester::new(options)
        .harvest(&catalogue, Some(vec!["d1".into()]), None, &SilentProgress)
        .unwrap();

    let d1 = &tables.datasets[0];
    assert!(d1.on_catalogue);
    assert!(!d1.on_registry);
    assert_eq!(d1.catalogue_org.as_deref(), Some("aafc-aac"));
    assert_eq!(
        d1.catalogue_org_title.as_deref(),
        Some("Agriculture and Agri-Food Canada")
    );
    assert!(d1.org.is_none());
    assert_eq!(
        d1.catalogue_link.as_deref(),
        Some("https://catalogue.test/dataset/d1")
    );
    assert_eq!(d1.maintainer_name, "Jane MacDonald");
    assert_eq!(tables.resources[0].lang, "eng/fra");
    assert_eq!(
        tables.resources[0].catalogue_link.as_deref(),
        Some("https://catalogue.test/dataset/d1/resource/r1")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_and_compliance_scenario() {
    let now = Local::now().naive_local();
    let forty_days_ago = timestamp(now - TimeDelta::days(40));

    let mock_server = MockServer::start().await;
    for (id, frequency) in [("d1", "P1M"), ("d2", "PT1S")] {
        let resource = csv_resource(&format!("{id}-r"), id, &forty_days_ago);
        Mock::given(method("GET"))
            .and(path("/api/3/action/package_show"))
            .and(query_param("id", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": dataset(id, frequency, json!([resource])),
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/3/action/package_show"))
        .and(query_param("id", "d3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": {"message": "Not found"}
        })))
        .mount(&mock_server)
        .await;

    let base_url = format!("{}/api/3/action/", mock_server.uri());
    let tables = tokio::task::spawn_blocking(move || {
        let http = RetryingHttpClient::new(HttpConfig::catalogue()).unwrap();
        let client = DirectCatalogueClient::with_http(&base_url, http).unwrap();
        let ids = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];

        let mut tables = Harvester::new(HarvestOptions::default())
            .harvest(&client, Some(ids), None, &SilentProgress)
            .unwrap();
        complete_missing_fields(&mut tables, now);
        tables
    })
    .await
    .unwrap();

    assert_eq!(tables.datasets.len(), 2);
    let d1 = &tables.datasets[0];
    let d2 = &tables.datasets[1];
    assert_eq!(d1.id, "d1");
    assert_eq!(d1.up_to_date, Some(false));
    assert_eq!(d2.up_to_date, Some(true));

    for dataset in &tables.datasets {
        assert_eq!(dataset.official_lang, Some(true));
        assert_eq!(dataset.open_formats, Some(true));
        // A "dataset" resource without any data dictionary
        assert_eq!(dataset.spec, Some(false));
        assert_eq!(
            dataset.modified.map(timestamp),
            Some(forty_days_ago.clone())
        );
    }
}
