//! HanaView CLI — the two pipeline phases, meant to be run by a scheduler.
//!
//! Commands:
//! - `fetch` — query every upstream source and overwrite the raw snapshot
//! - `generate` — enrich the raw snapshot with commentary, write the dated
//!   and latest reports and prune expired ones

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hanaview_core::clock::SystemClock;
use hanaview_core::data::{CircuitBreaker, HttpPageFetcher, YahooProvider};
use hanaview_runner::{generator_from_env, Pipeline, PipelineConfig, TextGenerator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hanaview",
    about = "HanaView — market data aggregation and daily report generation"
)]
struct Cli {
    /// Path to a TOML config file. Every setting has a default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the raw snapshot and reports (overrides the config).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all market data and overwrite the raw snapshot.
    Fetch,
    /// Generate today's report from the raw snapshot.
    Generate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    let upstreams = Upstreams::connect(&config)?;
    let clock = SystemClock;
    let pipeline = Pipeline::new(
        config,
        &upstreams.quotes,
        &upstreams.pages,
        upstreams.generator.as_ref(),
        &clock,
    );

    match cli.command {
        Commands::Fetch => {
            let path = pipeline.fetch_all()?;
            println!("Raw snapshot written to {}", path.display());
        }
        Commands::Generate => {
            let out = pipeline.generate_report()?;
            println!("Report for {} written to {}", out.date, out.report_path.display());
            println!("Latest alias: {}", out.latest_path.display());
            if !out.pruned.is_empty() {
                println!("Pruned {} expired report(s)", out.pruned.len());
            }
        }
    }
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Production upstreams: Yahoo quotes, plain HTTP pages, the configured
/// text generator.
struct Upstreams {
    quotes: YahooProvider,
    pages: HttpPageFetcher,
    generator: Box<dyn TextGenerator>,
}

impl Upstreams {
    fn connect(config: &PipelineConfig) -> Result<Self> {
        let settings = config.http_settings();
        let quotes = YahooProvider::new(settings.clone(), CircuitBreaker::for_batch_job())
            .context("failed to build quote provider")?;
        let pages = HttpPageFetcher::new(settings).context("failed to build page fetcher")?;
        let generator = generator_from_env(&config.commentary)?;
        Ok(Self {
            quotes,
            pages,
            generator,
        })
    }
}
