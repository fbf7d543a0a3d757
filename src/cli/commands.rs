//! CLI commands

use crate::core::source::serde_duration;
use crate::error::{Error, Result};
use crate::index::locator::{locate_all, LocateWindow};
use crate::query::decompose::plan;
use crate::query::request::ReadRequest;
use crate::source::{ensure_utc, SourceContext, StructuredFileSource};
use crate::storage::catalog::CatalogConfig;
use crate::storage::raw::{RawFileFormat, ELEMENT_SIZE_KEY};
use chrono::{DateTime, Duration, FixedOffset};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// temporal-fs CLI
#[derive(Parser)]
#[command(name = "temporal-fs")]
#[command(about = "Locate and read time-partitioned files by their names")]
pub struct Cli {
    /// Root folder of the file sources
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,
    /// File source configuration (JSON)
    #[arg(short, long, global = true, default_value = "file-sources.json")]
    pub config: PathBuf,
    /// Record width of raw files in bytes
    #[arg(long, global = true, default_value = "8")]
    pub element_size: usize,
    /// Header bytes to skip in raw files
    #[arg(long, global = true, default_value = "0")]
    pub header_size: u64,
    #[command(subcommand)]
    pub command: Commands,
}

/// Catalog and file source selection
#[derive(Args, Clone)]
pub struct Target {
    /// Catalog id
    #[arg(long)]
    pub catalog: String,
    /// File source id
    #[arg(long)]
    pub file_source: String,
}

/// UTC window, e.g. `2020-01-02T12:00:00Z`
#[derive(Args, Clone, Copy)]
pub struct Window {
    #[arg(long)]
    pub begin: DateTime<FixedOffset>,
    #[arg(long)]
    pub end: DateTime<FixedOffset>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List catalog ids
    Catalogs {
        /// Only catalogs below this path
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Show the time range covered by a file source
    Range {
        #[command(flatten)]
        target: Target,
    },
    /// Show the fraction of a window covered by files
    Availability {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        window: Window,
    },
    /// List the files found for a window
    Locate {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        window: Window,
    },
    /// Show the per-file reads for a window
    Plan {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        window: Window,
        /// Sample period, `hh:mm:ss[.fffffff]`
        #[arg(long, value_parser = parse_duration)]
        sample_period: Duration,
    },
    /// Read all resources of a catalog from raw files
    Read {
        /// Catalog id
        #[arg(long)]
        catalog: String,
        #[command(flatten)]
        window: Window,
        /// Sample period, `hh:mm:ss[.fffffff]`
        #[arg(long, value_parser = parse_duration)]
        sample_period: Duration,
    },
}

fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    serde_duration::parse(text).ok_or_else(|| format!("invalid duration '{text}'"))
}

/// Run a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config = CatalogConfig::from_path(&cli.config)?;
    let format = RawFileFormat::new(cli.element_size, cli.header_size);

    match cli.command {
        Commands::Catalogs { path } => {
            let source = open(&cli.root, config, format).await?;
            for id in source.catalog_ids(&path).await? {
                println!("{id}");
            }
        }
        Commands::Range { target } => {
            let source = open(&cli.root, config, format).await?;
            let range = source.time_range(&target.catalog, &target.file_source).await?;
            if range.is_empty() {
                println!("no data");
            } else {
                println!("{} .. {}", range.begin.to_rfc3339(), range.end.to_rfc3339());
            }
        }
        Commands::Availability { target, window } => {
            let source = open(&cli.root, config, format).await?;
            let value = source
                .availability(&target.catalog, &target.file_source, window.begin, window.end)
                .await?;
            println!("{:.2} %", value * 100.0);
        }
        Commands::Locate { target, window } => {
            let begin = ensure_utc(window.begin)?;
            let end = ensure_utc(window.end)?;
            let root = cli.root.clone();
            let lines = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                let groups = config.groups(&target.catalog)?;
                let group = groups.get(&target.file_source).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown file source '{}'", target.file_source))
                })?;
                let cancel = CancellationToken::new();
                let mut lines = Vec::new();
                for source_config in group.configs() {
                    let window = LocateWindow::Range { begin, end };
                    for file in locate_all(&root, window, source_config, &cancel)? {
                        lines.push(format!("{}  {}", file.resolved_time, file.path.display()));
                    }
                }
                Ok(lines)
            })
            .await??;
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Plan {
            target,
            window,
            sample_period,
        } => {
            let begin = ensure_utc(window.begin)?;
            let end = ensure_utc(window.end)?;
            let root = cli.root.clone();
            let lines = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                let groups = config.groups(&target.catalog)?;
                let group = groups.get(&target.file_source).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown file source '{}'", target.file_source))
                })?;
                let reads = plan(&root, begin, end, group, sample_period, &CancellationToken::new())?;
                Ok(reads
                    .iter()
                    .map(|read| format!("@{:<10} {}", read.buffer_offset, read.info))
                    .collect())
            })
            .await??;
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Read {
            catalog,
            window,
            sample_period,
        } => {
            let begin = ensure_utc(window.begin)?;
            let end = ensure_utc(window.end)?;
            let source = open(&cli.root, config, format).await?;
            let resources = source.catalog(&catalog).await?.resources;

            let mut requests = Vec::new();
            for resource in &resources {
                let element_size = resource
                    .properties
                    .get(ELEMENT_SIZE_KEY)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(cli.element_size);
                let file_source_id = resource.file_source_id().unwrap_or(&resource.id);
                requests.push(ReadRequest::for_window(
                    resource.id.clone(),
                    file_source_id,
                    sample_period,
                    element_size,
                    begin,
                    end,
                )?);
            }

            let progress = Arc::new(|fraction: f64| {
                tracing::debug!(progress = fraction, "read progress");
            });
            let done = source
                .read(&catalog, window.begin, window.end, requests, progress, CancellationToken::new())
                .await?;
            for request in done {
                println!(
                    "{}: {} of {} samples",
                    request.resource_id,
                    request.valid_count(),
                    request.element_count()
                );
            }
        }
    }
    Ok(())
}

async fn open(
    root: &std::path::Path,
    config: CatalogConfig,
    format: RawFileFormat,
) -> Result<StructuredFileSource> {
    let source = StructuredFileSource::new(Arc::new(format));
    source
        .initialize(SourceContext::from_config(root, config))
        .await?;
    Ok(source)
}
