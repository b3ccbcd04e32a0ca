use clap::{Parser, Subcommand};
use listing_export::cms::CmsClient;
use listing_export::config::{self, CONFIG_FILENAME};
use listing_export::images::HttpFetcher;
use listing_export::{export, output, rewrite, snapshot};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "listing-export")]
#[command(about = "Export property listings from the CMS into a static JSON snapshot")]
#[command(long_about = "\
Export property listings from the CMS into a static JSON snapshot

Records are fetched page by page, normalized into one canonical shape,
collapsed to one record per ID (the most complete copy wins), given a slug
derived from their title, and written as JSON for the static site build.

Snapshot layout:

  public/data/
  ├── properties.json                    # every property
  ├── properties-12.json                 # one file per ID
  ├── properties/3br-villa-in-seminyak.json  # one file per slug
  ├── property-index.json                # listing-card fields
  ├── metadata.json                      # timestamp and counts
  ├── image-mappings.json                # remote URL → local path
  └── image-converter.js                 # applies the mapping in the browser

With static_export enabled, images are downloaded to
public/property-images/<slug>/ and snapshot URLs point at the local copies.

Environment: CMS_URL, CMS_API_TOKEN, STATIC_EXPORT override the config file.
Run 'listing-export gen-config' to generate a documented listing-export.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the CMS is reachable
    Check,
    /// Check the CMS, then run the full export
    Export {
        /// Keep CMS image URLs even if static_export is enabled
        #[arg(long)]
        skip_images: bool,
    },
    /// Offline: dedupe and re-slug the existing snapshot
    Rebuild,
    /// Offline: download images for the existing snapshot
    Images,
    /// Replace CMS image URLs in an exported site with local paths
    Rewrite {
        /// Exported site directory
        #[arg(long)]
        dir: PathBuf,
    },
    /// Write generated slugs to CMS records that have none
    BackfillSlugs {
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a stock listing-export.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let load = || config::load_config_with_env(&cli.config);

    match cli.command {
        Command::Check => {
            let config = load()?;
            let cms = CmsClient::new(&config.cms)?;
            let report = export::check(&config, &cms);
            output::print_check(&report);
            if !report.is_ok() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Export { skip_images } => {
            let mut config = load()?;
            let cms = CmsClient::new(&config.cms)?;
            let report = export::check(&config, &cms);
            output::print_check(&report);
            if !report.is_ok() {
                error!("Aborting export: CMS is not reachable");
                return Ok(ExitCode::FAILURE);
            }
            if skip_images {
                config.static_export = false;
            }
            let fetcher = fetcher(&config)?;
            let report = export::run_export(&config, &cms, &fetcher)?;
            output::print_export(&report);
        }
        Command::Rebuild => {
            let config = load()?;
            let report = export::run_rebuild(&config)?;
            output::print_rebuild(&report);
        }
        Command::Images => {
            let config = load()?;
            let fetcher = fetcher(&config)?;
            let report = export::run_images(&config, &fetcher)?;
            output::print_images(&report);
        }
        Command::Rewrite { dir } => {
            let config = load()?;
            let mappings = snapshot::load_image_mappings(&config.output.data_dir)?;
            let report = rewrite::rewrite_static_export(&dir, &mappings)?;
            output::print_rewrite(&dir, &report);
        }
        Command::BackfillSlugs { dry_run } => {
            let config = load()?;
            let cms = CmsClient::new(&config.cms)?;
            let report = export::backfill_slugs(&config, &cms, dry_run)?;
            output::print_backfill(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn fetcher(config: &config::ExportConfig) -> Result<HttpFetcher, Box<dyn std::error::Error>> {
    Ok(HttpFetcher::new(Duration::from_secs(
        config.images.download_timeout_secs,
    ))?)
}
