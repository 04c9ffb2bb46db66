//! Aggregation and reconciliation pipeline.
//!
//! Fetch → extract (driven by the inferred schema) → aggregate → reconcile.

pub mod aggregate;
pub mod extract;
pub mod fetcher;
pub mod reconcile;
pub mod schema;

pub use aggregate::aggregate_monthly;
pub use reconcile::{Reconciler, TargetState};

use crate::error::{SyncError, SyncResult};
use crate::models::{AggregateRow, RawRecord, Row, SchemaChange};
use crate::store::RecordStore;
use fetcher::fetch_all_records as fetch_all_records_from;
use schema::{infer_fields, InferredFields};
use tracing::{info, warn};

pub const DEFAULT_SUMMARY_TITLE: &str = "Monthly Aggregate Summary";

/// Settings for one pipeline, fixed at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Collection holding the daily records.
    pub source_database_id: Option<String>,
    /// Page under which the summary collection lives.
    pub parent_page_id: Option<String>,
    /// Summary collection to use directly, skipping the lookup by title.
    pub target_database_id: Option<String>,
    /// Numeric property to average.
    pub aggregation_attribute: String,
    /// Single date property to anchor rows on; all date properties if unset.
    pub date_property: Option<String>,
    pub summary_title: String,
    /// Abort on the first unparseable date instead of dropping the record.
    pub strict_dates: bool,
    /// Compute aggregates without writing to the summary collection.
    pub dry_run: bool,
    /// List the daily rows only; no aggregation and no summary collection.
    pub daily_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_database_id: None,
            parent_page_id: None,
            target_database_id: None,
            aggregation_attribute: "rnd".to_string(),
            date_property: None,
            summary_title: DEFAULT_SUMMARY_TITLE.to_string(),
            strict_dates: false,
            dry_run: false,
            daily_only: false,
        }
    }
}

/// What a pipeline run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub attribute: String,
    pub records_fetched: usize,
    pub rows_extracted: usize,
    /// Records carrying none of the selected properties.
    pub records_empty: usize,
    /// Records dropped because their date could not be parsed.
    pub records_rejected: Vec<String>,
    /// Extracted daily rows, in fetch order.
    pub rows: Vec<Row>,
    /// Empty for a daily-only listing.
    pub aggregates: Vec<AggregateRow>,
    /// `None` on a dry run.
    pub summary_database_id: Option<String>,
    pub summary_created: bool,
    pub schema_changes: Vec<SchemaChange>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
}

/// The rollup pipeline over a record store.
pub struct Pipeline<S: RecordStore> {
    config: PipelineConfig,
    store: S,
}

impl<S: RecordStore> Pipeline<S> {
    pub fn new(config: PipelineConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch every record of `database_id`, or of the configured source.
    pub async fn fetch_all_records(&self, database_id: Option<&str>) -> SyncResult<Vec<RawRecord>> {
        let id = database_id
            .or(self.config.source_database_id.as_deref())
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SyncError::config("a source database id is required"))?;

        fetch_all_records_from(&self.store, id).await
    }

    /// Inspect a collection's schema for temporal and numeric properties.
    pub async fn infer_fields(&self, database_id: &str) -> SyncResult<InferredFields> {
        let schema = self.store.get_collection_schema(database_id).await?;
        Ok(infer_fields(&schema, self.config.date_property.as_deref()))
    }

    /// Fetch the source collection and convert it into rows.
    pub async fn daily_rows(&self, summary: &mut RunSummary) -> SyncResult<Vec<Row>> {
        let records = self.fetch_all_records(None).await?;
        summary.records_fetched = records.len();
        info!("Fetched {} daily records", records.len());

        // fetch_all_records has already validated the id
        let source = self.config.source_database_id.as_deref().unwrap_or_default();
        let fields = self.infer_fields(source).await?;
        if fields.is_empty() {
            warn!("Source schema has no date or numeric properties");
        } else if !self.config.daily_only
            && !fields.has_numeric(self.config.aggregation_attribute.trim())
        {
            warn!(
                "Source schema has no numeric property '{}'",
                self.config.aggregation_attribute
            );
        }

        let extraction = extract::extract_rows(&records, &fields, self.config.strict_dates)?;
        summary.rows_extracted = extraction.rows.len();
        summary.records_empty = extraction.empty;
        summary.records_rejected = extraction.rejected;
        info!(
            "Extracted {} rows ({} empty, {} rejected)",
            summary.rows_extracted,
            summary.records_empty,
            summary.records_rejected.len()
        );

        Ok(extraction.rows)
    }

    /// Run the pipeline end to end.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        let attribute = self.config.aggregation_attribute.trim();
        let daily_only = self.config.daily_only;
        if !daily_only && attribute.is_empty() {
            return Err(SyncError::config("aggregation attribute is not set"));
        }
        if !self.config.dry_run
            && !daily_only
            && self.config.parent_page_id.is_none()
            && self.config.target_database_id.is_none()
        {
            return Err(SyncError::config(
                "a parent page id or target database id is required",
            ));
        }

        let mut summary = RunSummary {
            attribute: attribute.to_string(),
            ..RunSummary::default()
        };

        let rows = self.daily_rows(&mut summary).await?;
        summary.rows = rows;
        if daily_only {
            info!("Daily listing: aggregation skipped");
            return Ok(summary);
        }

        summary.aggregates = aggregate_monthly(&summary.rows, attribute)?;
        info!("Aggregated {} months", summary.aggregates.len());

        if self.config.dry_run {
            info!("Dry run: summary collection left untouched");
            return Ok(summary);
        }

        let reconciler = Reconciler::new(&self.store, attribute, &self.config.summary_title);
        let report = reconciler
            .reconcile(
                self.config.parent_page_id.as_deref(),
                self.config.target_database_id.as_deref(),
                &summary.aggregates,
            )
            .await?;

        summary.summary_database_id = Some(report.collection_id);
        summary.summary_created = report.state == TargetState::Created;
        summary.schema_changes = report.schema_changes;
        summary.created = report.created;
        summary.updated = report.updated;

        Ok(summary)
    }
}
