//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Notion Rollup - monthly summaries of daily Notion records
///
/// Reads every record of a daily-tracking database, averages one numeric
/// property per calendar month, and mirrors the result into a
/// "Monthly Aggregate Summary" database (created on first run).
///
/// Examples:
///   notion-rollup --source-db <ID> --parent-page <ID>
///   notion-rollup --source-db <ID> --parent-page <ID> --attribute score
///   notion-rollup --source-db <ID> --dry-run --format json
///   notion-rollup --source-db <ID> --daily-only
///   notion-rollup --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Notion integration token
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Database holding the daily records
    #[arg(short, long, value_name = "ID", env = "NOTION_SOURCE_DB_ID")]
    pub source_db: Option<String>,

    /// Page that contains the summary database
    #[arg(short, long, value_name = "ID", env = "NOTION_PARENT_PAGE_ID")]
    pub parent_page: Option<String>,

    /// Summary database to update directly
    ///
    /// Skips looking the database up by title under the parent page.
    #[arg(long, value_name = "ID")]
    pub target_db: Option<String>,

    /// Numeric property to average per month
    #[arg(short, long, value_name = "PROPERTY")]
    pub attribute: Option<String>,

    /// Date property that anchors each record to a month
    ///
    /// If not specified, every date property is read in name order and the
    /// last one present wins.
    #[arg(long, value_name = "PROPERTY")]
    pub date_property: Option<String>,

    /// Notion API base URL
    #[arg(long, value_name = "URL", env = "NOTION_API_URL")]
    pub api_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fail on the first record whose date cannot be parsed
    #[arg(long)]
    pub strict_dates: bool,

    /// Fetch and aggregate without writing to Notion
    #[arg(long)]
    pub dry_run: bool,

    /// List the daily records only, without aggregating
    #[arg(long)]
    pub daily_only: bool,

    /// Report format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// Write the run report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .notion-rollup.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no report on stdout)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .notion-rollup.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
        }
    }

    /// Parse the format name used in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate API URL format
        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Notion API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref attribute) = self.attribute {
            if attribute.trim().is_empty() {
                return Err("Aggregation attribute cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
