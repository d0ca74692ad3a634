//! Command-line interface for the inventory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::catalogue::{CatalogueClient, DirectCatalogueClient};
use crate::compliance::complete_missing_fields;
use crate::config::{site_root, InventoryConfig, REGISTRY_BASE_URL};
use crate::error::{InventoryError, Result};
use crate::harvester::{HarvestOptions, Harvester};
use crate::http::{HttpConfig, RetryingHttpClient};
use crate::types::{DatasetRecord, InventoryTables, Platform};

/// Open data inventory - harvest CKAN datasets and check their compliance.
#[derive(Parser)]
#[command(name = "open-data-inventory")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where and how to reach the catalogue.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// CKAN action API base URL (default: $CKAN_BASE_URL or the registry)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Go through a headless browser session (catalogues behind single sign-on)
    #[arg(long)]
    pub browser: bool,

    /// Accept invalid TLS certificates from the catalogue
    #[arg(long, conflicts_with = "browser")]
    pub insecure: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List organizations as `id<TAB>title`.
    Orgs {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Harvest datasets and resources, then run the compliance checks.
    Harvest {
        #[command(flatten)]
        source: SourceArgs,

        /// Harvest the datasets owned by this organization id
        #[arg(long, conflicts_with = "ids")]
        org: Option<String>,

        /// Harvest this dataset id (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Existing output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// File name prefix (default: today's date)
        #[arg(long)]
        prefix: Option<String>,

        /// Records come from a departmental catalogue rather than the registry
        #[arg(long)]
        catalogue: bool,

        /// Catalogue site root used for links (default: derived from the base URL)
        #[arg(long, requires = "catalogue")]
        site_url: Option<String>,

        /// After a catalogue harvest, look the datasets up on the registry
        #[arg(long, requires = "catalogue")]
        check_registry: bool,

        /// Worker threads (0 = default parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip resource URL checks
        #[arg(long)]
        no_url_check: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = InventoryConfig::from_env()?;

    match cli.command {
        Commands::Orgs { source } => orgs_command(&source, &config),
        Commands::Harvest {
            source,
            org,
            ids,
            output,
            prefix,
            catalogue,
            site_url,
            check_registry,
            workers,
            no_url_check,
        } => {
            let config = match workers {
                Some(workers) => config.with_workers(workers),
                None => config,
            };
            let request = HarvestRequest {
                org,
                ids,
                output,
                prefix,
                catalogue,
                site_url,
                check_registry,
                check_urls: !no_url_check,
            };
            harvest_command(&source, &config, request)
        }
    }
}

struct HarvestRequest {
    org: Option<String>,
    ids: Vec<String>,
    output: PathBuf,
    prefix: Option<String>,
    catalogue: bool,
    site_url: Option<String>,
    check_registry: bool,
    check_urls: bool,
}

/// Resolve the base URL from the flag or the environment configuration.
fn resolve_base_url(source: &SourceArgs, config: &InventoryConfig) -> Result<InventoryConfig> {
    match &source.base_url {
        Some(base_url) => config.clone().with_base_url(base_url),
        None => Ok(config.clone()),
    }
}

/// Build the catalogue client selected on the command line.
fn open_client(source: &SourceArgs, config: &InventoryConfig) -> Result<Box<dyn CatalogueClient>> {
    if source.browser {
        return open_browser_client(&config.base_url);
    }
    let http = RetryingHttpClient::new(catalogue_http_config(source, config))?;
    Ok(Box::new(DirectCatalogueClient::with_http(
        &config.base_url,
        http,
    )?))
}

fn catalogue_http_config(source: &SourceArgs, config: &InventoryConfig) -> HttpConfig {
    if source.insecure {
        tracing::warn!(base_url = %config.base_url, "TLS certificate verification disabled");
    }
    HttpConfig::catalogue()
        .with_calls_per_second(Some(config.calls_per_second))
        .with_skip_tls_verify(source.insecure)
}

#[cfg(feature = "browser")]
fn open_browser_client(base_url: &str) -> Result<Box<dyn CatalogueClient>> {
    use crate::catalogue::{BrowserCatalogueClient, ChromiumRenderer};

    let renderer = ChromiumRenderer::launch()?;
    Ok(Box::new(BrowserCatalogueClient::new(base_url, renderer)?))
}

#[cfg(not(feature = "browser"))]
fn open_browser_client(_base_url: &str) -> Result<Box<dyn CatalogueClient>> {
    Err(InventoryError::Browser(
        "this build does not include browser support (enable the `browser` feature)".to_string(),
    ))
}

/// Execute the orgs command.
fn orgs_command(source: &SourceArgs, config: &InventoryConfig) -> Result<()> {
    let config = resolve_base_url(source, config)?;
    let client = open_client(source, &config)?;
    let organizations = client.get_organizations()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (id, title) in &organizations {
        writeln!(out, "{id}\t{title}")?;
    }
    Ok(())
}

/// Check that `path` is an existing directory.
fn ensure_output_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(InventoryError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Output directory does not exist: {}", path.display()),
        )));
    }
    if !path.is_dir() {
        return Err(InventoryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Output path is not a directory: {}", path.display()),
        )));
    }
    Ok(())
}

fn progress_bar(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.green}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("=- "),
    );
    pb.set_message(message);
    pb
}

/// Execute the harvest command.
fn harvest_command(
    source: &SourceArgs,
    config: &InventoryConfig,
    request: HarvestRequest,
) -> Result<()> {
    // Validate inputs before making HTTP requests
    let config = resolve_base_url(source, config)?;
    ensure_output_dir(&request.output)?;

    let platform = if request.catalogue {
        Platform::Catalogue {
            site_url: request
                .site_url
                .clone()
                .unwrap_or_else(|| site_root(&config.base_url)),
        }
    } else {
        Platform::Registry
    };

    let client = open_client(source, &config)?;

    let mut harvester = Harvester::new(
        HarvestOptions::default()
            .with_platform(platform)
            .with_workers(config.workers),
    );
    if request.check_urls {
        harvester = harvester.with_probe(RetryingHttpClient::liveness()?);
    }

    let target = match (&request.org, request.ids.is_empty()) {
        (Some(org), _) => format!("organization {}", style(org).cyan()),
        (None, false) => format!("{} dataset(s)", style(request.ids.len()).cyan()),
        (None, true) => "all datasets".to_string(),
    };
    println!(
        "{} {} from {}",
        style("Harvesting").bold(),
        target,
        style(&config.base_url).green()
    );

    let dataset_ids = (!request.ids.is_empty()).then(|| request.ids.clone());
    let pb = progress_bar("Processed datasets");
    let mut tables = match harvester.harvest(&*client, dataset_ids, request.org.as_deref(), &pb) {
        Ok(tables) => tables,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    if request.check_registry {
        let registry = DirectCatalogueClient::new(REGISTRY_BASE_URL)?;
        let pb = progress_bar("Checked on registry");
        Harvester::new(HarvestOptions::default()).update_platform_info(
            &mut tables,
            &registry,
            None,
            &pb,
        );
    }

    complete_missing_fields(&mut tables, chrono::Local::now().naive_local());
    print_summary(&tables);

    let prefix = request
        .prefix
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let datasets_path = request.output.join(format!("{prefix}_datasets.json"));
    let resources_path = request.output.join(format!("{prefix}_resources.json"));
    write_json(&datasets_path, &tables.datasets)?;
    write_json(&resources_path, &tables.resources)?;

    println!();
    println!(
        "{} {}",
        style("Saved to:").green().bold(),
        datasets_path.display()
    );
    println!(
        "{} {}",
        style("Saved to:").green().bold(),
        resources_path.display()
    );

    Ok(())
}

fn print_summary(tables: &InventoryTables) {
    let count = |flag: fn(&DatasetRecord) -> Option<bool>| {
        tables.datasets.iter().filter(|d| flag(d) == Some(true)).count()
    };
    let total = tables.datasets.len();

    println!("  Datasets: {}", style(total).green());
    println!("  Resources: {}", style(tables.resources.len()).green());
    println!("  Up to date: {}/{total}", count(|d| d.up_to_date));
    println!("  Official languages: {}/{total}", count(|d| d.official_lang));
    println!("  Open formats: {}/{total}", count(|d| d.open_formats));
    println!("  Data dictionary: {}/{total}", count(|d| d.spec));
}

/// Write rows as a pretty-printed JSON array.
fn write_json<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "Table written");
    Ok(())
}
