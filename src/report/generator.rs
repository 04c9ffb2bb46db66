//! Run report generation.
//!
//! This module renders a pipeline run as a Markdown document or as JSON.

use crate::models::{weekday_name, Row, SchemaChange};
use crate::pipeline::{PipelineConfig, RunSummary};
use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata about the run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Property that was averaged.
    pub attribute: String,
    pub dry_run: bool,
    pub daily_only: bool,
    pub records_fetched: usize,
    pub rows_extracted: usize,
    pub records_empty: usize,
    pub records_rejected: Vec<String>,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// One month of the summary table.
#[derive(Debug, Clone, Serialize)]
pub struct MonthLine {
    pub label: String,
    pub year: i32,
    pub month: String,
    /// First day of the month, `YYYY-MM-01`.
    pub date: String,
    pub average: f64,
    pub samples: usize,
    /// `created`, `updated`, or `pending` on a dry run.
    pub status: String,
}

/// One extracted daily record.
#[derive(Debug, Clone, Serialize)]
pub struct DailyLine {
    pub date: Option<String>,
    pub year: Option<i32>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub values: BTreeMap<String, f64>,
}

impl From<&Row> for DailyLine {
    fn from(row: &Row) -> Self {
        Self {
            date: row.date.map(|ts| {
                if ts.time() == NaiveTime::MIN {
                    ts.format("%Y-%m-%d").to_string()
                } else {
                    ts.format("%Y-%m-%d %H:%M").to_string()
                }
            }),
            year: row.year,
            month: row.month.map(|m| m.name().to_string()),
            day: row.day.map(|d| weekday_name(d).to_string()),
            values: row.values.clone(),
        }
    }
}

/// Changes made to the summary database.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDatabase {
    pub id: String,
    pub created: bool,
    pub schema_changes: Vec<SchemaChange>,
}

/// The complete run report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub months: Vec<MonthLine>,
    pub daily: Vec<DailyLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_database: Option<SummaryDatabase>,
}

impl Report {
    /// Build a report from a finished run.
    pub fn from_summary(
        summary: &RunSummary,
        config: &PipelineConfig,
        duration_seconds: f64,
    ) -> Self {
        let months = summary
            .aggregates
            .iter()
            .map(|row| {
                let label = row.key.label();
                let status = if summary.created.contains(&label) {
                    "created"
                } else if summary.updated.contains(&label) {
                    "updated"
                } else {
                    "pending"
                };
                MonthLine {
                    year: row.key.year,
                    month: row.key.month.name().to_string(),
                    date: row.key.first_day_string(),
                    average: row.average,
                    samples: row.samples,
                    status: status.to_string(),
                    label,
                }
            })
            .collect();

        let summary_database = summary.summary_database_id.as_ref().map(|id| SummaryDatabase {
            id: id.clone(),
            created: summary.summary_created,
            schema_changes: summary.schema_changes.clone(),
        });

        Self {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                attribute: summary.attribute.clone(),
                dry_run: config.dry_run,
                daily_only: config.daily_only,
                records_fetched: summary.records_fetched,
                rows_extracted: summary.rows_extracted,
                records_empty: summary.records_empty,
                records_rejected: summary.records_rejected.clone(),
                duration_seconds,
            },
            months,
            daily: summary.rows.iter().map(DailyLine::from).collect(),
            summary_database,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Monthly Rollup Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    if !report.metadata.daily_only {
        output.push_str(&generate_months_section(
            &report.metadata.attribute,
            &report.months,
        ));
    }
    if let Some(ref database) = report.summary_database {
        output.push_str(&generate_database_section(database));
    }
    output.push_str(&generate_daily_section(&report.daily));
    output.push_str(&generate_rejected_section(&report.metadata.records_rejected));

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Run\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if metadata.daily_only {
        section.push_str("- **Mode:** daily listing\n");
    } else {
        section.push_str(&format!("- **Attribute:** `{}`\n", metadata.attribute));
    }
    section.push_str(&format!(
        "- **Records Fetched:** {}\n",
        metadata.records_fetched
    ));
    section.push_str(&format!("- **Rows Extracted:** {}\n", metadata.rows_extracted));
    if metadata.records_empty > 0 {
        section.push_str(&format!("- **Empty Records:** {}\n", metadata.records_empty));
    }
    if !metadata.records_rejected.is_empty() {
        section.push_str(&format!(
            "- **Rejected Records:** {}\n",
            metadata.records_rejected.len()
        ));
    }
    if metadata.dry_run {
        section.push_str("- **Dry Run:** nothing was written\n");
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the monthly averages table.
fn generate_months_section(attribute: &str, months: &[MonthLine]) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Monthly Average {}\n\n", attribute));

    if months.is_empty() {
        section.push_str("No dated records carried this attribute.\n\n");
        return section;
    }

    section.push_str("| Month | Average | Days | Status |\n");
    section.push_str("|:---|---:|:---:|:---|\n");
    for line in months {
        section.push_str(&format!(
            "| {} | {:.2} | {} | {} |\n",
            line.label, line.average, line.samples, line.status
        ));
    }
    section.push('\n');

    section
}

/// Generate the summary database section.
fn generate_database_section(database: &SummaryDatabase) -> String {
    let mut section = String::new();

    section.push_str("## Summary Database\n\n");
    section.push_str(&format!(
        "- **ID:** `{}`{}\n",
        database.id,
        if database.created { " (created)" } else { "" }
    ));
    for change in &database.schema_changes {
        section.push_str(&format!("- Schema: {}\n", change));
    }
    section.push('\n');

    section
}

/// Generate the daily records table, one column per numeric property.
fn generate_daily_section(daily: &[DailyLine]) -> String {
    let mut section = String::new();

    section.push_str("## Daily Records\n\n");

    if daily.is_empty() {
        section.push_str("No records were extracted.\n\n");
        return section;
    }

    let columns: BTreeSet<&str> = daily
        .iter()
        .flat_map(|line| line.values.keys().map(String::as_str))
        .collect();

    section.push_str("| Date | Year | Month | Day |");
    for column in &columns {
        section.push_str(&format!(" {} |", column));
    }
    section.push_str("\n|:---|:---:|:---|:---|");
    for _ in &columns {
        section.push_str("---:|");
    }
    section.push('\n');

    for line in daily {
        section.push_str(&format!(
            "| {} | {} | {} | {} |",
            line.date.as_deref().unwrap_or("-"),
            line.year.map_or_else(|| "-".to_string(), |y| y.to_string()),
            line.month.as_deref().unwrap_or("-"),
            line.day.as_deref().unwrap_or("-"),
        ));
        for column in &columns {
            match line.values.get(*column) {
                Some(value) => section.push_str(&format!(" {} |", value)),
                None => section.push_str(" - |"),
            }
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// List records dropped for unparseable dates.
fn generate_rejected_section(rejected: &[String]) -> String {
    if rejected.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Rejected Records\n\n");
    for id in rejected {
        section.push_str(&format!("- `{}`\n", id));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
