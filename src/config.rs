//! Configuration file handling.
//!
//! This module handles loading `.notion-rollup.toml` and merging it with
//! command-line arguments into the settings each component receives.

use crate::pipeline::{PipelineConfig, DEFAULT_SUMMARY_TITLE};
use crate::store::notion::{DEFAULT_API_URL, DEFAULT_NOTION_VERSION};
use crate::store::NotionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".notion-rollup.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Notion API settings.
    #[serde(default)]
    pub notion: NotionSection,

    /// Source, destination, and aggregation settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Run report settings.
    #[serde(default)]
    pub report: ReportSection,
}

/// Notion API settings. The token is never read from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionSection {
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Value of the `Notion-Version` header.
    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotionSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            notion_version: default_notion_version(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_notion_version() -> String {
    DEFAULT_NOTION_VERSION.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Database holding the daily records.
    #[serde(default)]
    pub source_database_id: Option<String>,

    /// Page that contains (or will contain) the summary database.
    #[serde(default)]
    pub parent_page_id: Option<String>,

    /// Summary database to use directly instead of looking it up by title.
    #[serde(default)]
    pub target_database_id: Option<String>,

    /// Numeric property to average per month.
    #[serde(default = "default_attribute")]
    pub aggregation_attribute: String,

    /// Date property rows are anchored on. All date properties if unset.
    #[serde(default)]
    pub date_property: Option<String>,

    /// Title of the summary database.
    #[serde(default = "default_summary_title")]
    pub summary_title: String,

    /// Abort on unparseable dates instead of skipping the record.
    #[serde(default)]
    pub strict_dates: bool,

    /// List daily rows without aggregating or touching the summary database.
    #[serde(default)]
    pub daily_only: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            source_database_id: None,
            parent_page_id: None,
            target_database_id: None,
            aggregation_attribute: default_attribute(),
            date_property: None,
            summary_title: default_summary_title(),
            strict_dates: false,
            daily_only: false,
        }
    }
}

fn default_attribute() -> String {
    "rnd".to_string()
}

fn default_summary_title() -> String {
    DEFAULT_SUMMARY_TITLE.to_string()
}

/// Report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    /// `markdown` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Treat blank strings as unset.
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from a directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.notion.api_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.notion.timeout_seconds = timeout;
        }

        if args.source_db.is_some() {
            self.pipeline.source_database_id = args.source_db.clone();
        }
        if args.parent_page.is_some() {
            self.pipeline.parent_page_id = args.parent_page.clone();
        }
        if args.target_db.is_some() {
            self.pipeline.target_database_id = args.target_db.clone();
        }
        if let Some(ref attribute) = args.attribute {
            self.pipeline.aggregation_attribute = attribute.clone();
        }
        if args.date_property.is_some() {
            self.pipeline.date_property = args.date_property.clone();
        }
        if args.strict_dates {
            self.pipeline.strict_dates = true;
        }
        if args.daily_only {
            self.pipeline.daily_only = true;
        }

        if let Some(format) = args.format {
            self.report.format = format.as_str().to_string();
        }
    }

    /// Freeze the pipeline settings.
    pub fn pipeline_config(&self, dry_run: bool) -> PipelineConfig {
        PipelineConfig {
            source_database_id: non_empty(&self.pipeline.source_database_id),
            parent_page_id: non_empty(&self.pipeline.parent_page_id),
            target_database_id: non_empty(&self.pipeline.target_database_id),
            aggregation_attribute: self.pipeline.aggregation_attribute.trim().to_string(),
            date_property: non_empty(&self.pipeline.date_property),
            summary_title: self.pipeline.summary_title.clone(),
            strict_dates: self.pipeline.strict_dates,
            dry_run,
            daily_only: self.pipeline.daily_only,
        }
    }

    /// Connection settings for the Notion client.
    pub fn notion_config(&self, token: &str) -> NotionConfig {
        NotionConfig {
            api_url: self.notion.api_url.clone(),
            token: token.to_string(),
            notion_version: self.notion.notion_version.clone(),
            timeout_seconds: self.notion.timeout_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
