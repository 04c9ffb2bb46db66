//! Notion Rollup - monthly summaries of daily Notion records
//!
//! A CLI tool that reads a daily-tracking Notion database, averages one
//! numeric property per calendar month, and keeps a summary database in
//! step with the result.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, API failure, unparseable date, etc.)

mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod store;

use anyhow::{Context, Result};
use cli::{Args, ReportFormat};
use config::{Config, CONFIG_FILE};
use pipeline::Pipeline;
use report::Report;
use std::path::Path;
use std::time::Instant;
use store::NotionClient;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Notion Rollup v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_rollup(args).await {
        error!("Rollup failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .notion-rollup.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Fill in the source database and parent page ids.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run fetch, aggregate, and reconcile, then emit the run report.
async fn run_rollup(args: Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let format = ReportFormat::from_name(&config.report.format).unwrap_or_else(|| {
        warn!(
            "Unknown report format '{}', using markdown",
            config.report.format
        );
        ReportFormat::Markdown
    });

    let token = args
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .context("A Notion token is required (--token or NOTION_TOKEN)")?;

    let client = NotionClient::new(config.notion_config(token))?;
    let pipeline = Pipeline::new(config.pipeline_config(args.dry_run), client);

    if pipeline.config().daily_only {
        info!("Listing daily records");
    } else {
        info!(
            "Averaging '{}' per month",
            pipeline.config().aggregation_attribute
        );
    }
    let summary = pipeline.run().await?;

    let duration = start_time.elapsed().as_secs_f64();
    let report = Report::from_summary(&summary, pipeline.config(), duration);

    let output = match format {
        ReportFormat::Json => report::generate_json_report(&report)?,
        ReportFormat::Markdown => report::generate_markdown_report(&report),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report saved to {}", path.display());
        }
        None if !args.quiet => println!("{}", output),
        None => {}
    }

    info!(
        "Rollup complete: {} rows, {} months, {} created, {} updated in {:.1}s",
        summary.rows.len(),
        summary.aggregates.len(),
        summary.created.len(),
        summary.updated.len(),
        duration
    );

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_from_dir(Path::new(".")) {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
