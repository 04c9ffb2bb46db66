//! Summary collection reconciliation.
//!
//! Locates (or provisions) the summary collection under a parent page,
//! repairs its schema, and upserts one record per month keyed by the
//! `"<Month> <Year>"` label held in the title property.

use crate::error::{SyncError, SyncResult};
use crate::models::{AggregateRow, FieldSchema, PropertyKind, PropertyValue, RawRecord, SchemaChange, SummaryRecord};
use crate::pipeline::fetcher::fetch_all_records;
use crate::store::{PropertyMap, RecordStore};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Title property holding the month label.
pub const TITLE_PROPERTY: &str = "Name";

/// Date property holding the first day of the month.
pub const DATE_PROPERTY: &str = "Date";

/// Name of the numeric property for an aggregation attribute.
pub fn value_property(attribute: &str) -> String {
    format!("Average {}", attribute)
}

/// Schema a summary collection must carry.
pub fn expected_schema(attribute: &str) -> FieldSchema {
    let mut schema = FieldSchema::new();
    schema.insert(TITLE_PROPERTY.to_string(), PropertyKind::Title);
    schema.insert(DATE_PROPERTY.to_string(), PropertyKind::Date);
    schema.insert(value_property(attribute), PropertyKind::Number);
    schema
}

/// Changes needed to bring `current` in line with the expected schema.
///
/// A collection has exactly one title property, so a title under another
/// name is renamed rather than a second one added or another property
/// retyped. A non-title property already called `Name` is moved aside first.
pub fn schema_changes(current: &FieldSchema, attribute: &str) -> Vec<SchemaChange> {
    let mut changes = Vec::new();
    let legacy_title = current
        .iter()
        .find(|(name, kind)| **kind == PropertyKind::Title && *name != TITLE_PROPERTY)
        .map(|(name, _)| name.clone());

    for (name, kind) in expected_schema(attribute) {
        let existing = current.get(&name);
        if existing == Some(&kind) {
            continue;
        }

        if kind == PropertyKind::Title {
            match (existing, legacy_title.clone()) {
                (Some(_), Some(from)) => {
                    changes.push(SchemaChange::Rename {
                        from: name.clone(),
                        to: free_name(current, &name),
                    });
                    changes.push(SchemaChange::Rename { from, to: name });
                }
                (None, Some(from)) => changes.push(SchemaChange::Rename { from, to: name }),
                (Some(_), None) => changes.push(SchemaChange::Retype { name, kind }),
                (None, None) => changes.push(SchemaChange::Add { name, kind }),
            }
        } else if existing.is_some() {
            changes.push(SchemaChange::Retype { name, kind });
        } else {
            changes.push(SchemaChange::Add { name, kind });
        }
    }

    changes
}

/// A property name based on `name` that `schema` does not use yet.
fn free_name(schema: &FieldSchema, name: &str) -> String {
    let base = format!("{} (previous)", name);
    let mut candidate = base.clone();
    let mut n = 2;
    while schema.contains_key(&candidate) {
        candidate = format!("{} {}", base, n);
        n += 1;
    }
    candidate
}

/// How the summary collection was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Provisioned by this run with the expected schema.
    Created,
    /// Already present; its schema was verified.
    Verified,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub collection_id: String,
    pub state: TargetState,
    pub schema_changes: Vec<SchemaChange>,
    /// Labels of records created, in processing order.
    pub created: Vec<String>,
    /// Labels of records updated, in processing order.
    pub updated: Vec<String>,
}

/// Mirrors aggregate rows into a summary collection.
pub struct Reconciler<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    attribute: String,
    title: String,
}

impl<'a, S: RecordStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, attribute: &str, title: &str) -> Self {
        Self {
            store,
            attribute: attribute.to_string(),
            title: title.to_string(),
        }
    }

    /// Find a child collection titled like the summary, or create one.
    pub async fn locate_or_create(&self, parent_id: &str) -> SyncResult<(String, TargetState)> {
        let wanted = self.title.trim().to_lowercase();
        let children = self.store.list_collection_children(parent_id).await?;

        let existing = children.into_iter().find(|block| {
            block.is_collection()
                && block
                    .title
                    .as_deref()
                    .map_or(false, |t| t.trim().to_lowercase() == wanted)
        });

        if let Some(block) = existing {
            info!("Found existing summary collection '{}' ({})", self.title, block.id);
            return Ok((block.id, TargetState::Verified));
        }

        let id = self
            .store
            .create_collection(parent_id, &self.title, &expected_schema(&self.attribute))
            .await?;
        info!("Created summary collection '{}' ({})", self.title, id);
        Ok((id, TargetState::Created))
    }

    /// Add or fix the properties the summary records rely on.
    pub async fn ensure_schema(&self, collection_id: &str) -> SyncResult<Vec<SchemaChange>> {
        let current = self.store.get_collection_schema(collection_id).await?;
        let changes = schema_changes(&current, &self.attribute);

        if changes.is_empty() {
            debug!("Summary collection {} schema is up to date", collection_id);
        } else {
            for change in &changes {
                info!("Schema change on {}: {}", collection_id, change);
            }
            self.store
                .update_collection_schema(collection_id, &changes)
                .await?;
        }

        Ok(changes)
    }

    /// Map each record's title text to its id. Untitled records are skipped.
    pub fn build_lookup(records: &[RawRecord]) -> SyncResult<HashMap<String, String>> {
        let mut lookup = HashMap::new();

        for record in records {
            let title = match record.property(TITLE_PROPERTY) {
                Some(PropertyValue::Title(text)) => text.trim(),
                _ => {
                    return Err(SyncError::SchemaMismatch {
                        record_id: record.id.clone(),
                        property: TITLE_PROPERTY.to_string(),
                    })
                }
            };

            if title.is_empty() {
                debug!("Skipping untitled summary record {}", record.id);
                continue;
            }
            if lookup.contains_key(title) {
                warn!(
                    "Duplicate summary record '{}' ({}); updating the first one only",
                    title, record.id
                );
                continue;
            }
            lookup.insert(title.to_string(), record.id.clone());
        }

        Ok(lookup)
    }

    /// Update matching records in place and create the missing ones.
    pub async fn upsert(
        &self,
        collection_id: &str,
        aggregates: &[AggregateRow],
    ) -> SyncResult<(Vec<String>, Vec<String>)> {
        let existing = fetch_all_records(self.store, collection_id).await?;
        let mut lookup = Self::build_lookup(&existing)?;
        let value_name = value_property(&self.attribute);

        let mut created = Vec::new();
        let mut updated = Vec::new();

        for row in aggregates {
            let summary = SummaryRecord::from(row);
            let mut properties = PropertyMap::new();
            properties.insert(value_name.clone(), PropertyValue::Number(Some(summary.average)));
            properties.insert(
                DATE_PROPERTY.to_string(),
                PropertyValue::Date(Some(summary.date.clone())),
            );

            match lookup.get(&summary.label) {
                Some(record_id) => {
                    self.store.update_record(record_id, &properties).await?;
                    info!("Updated: {} -> {}", summary.label, summary.average);
                    updated.push(summary.label);
                }
                None => {
                    properties.insert(
                        TITLE_PROPERTY.to_string(),
                        PropertyValue::Title(summary.label.clone()),
                    );
                    let record_id = self.store.create_record(collection_id, &properties).await?;
                    info!("Added: {} -> {}", summary.label, summary.average);
                    lookup.insert(summary.label.clone(), record_id);
                    created.push(summary.label);
                }
            }
        }

        Ok((created, updated))
    }

    /// Run the whole reconciliation against a parent page or a known target.
    pub async fn reconcile(
        &self,
        parent_id: Option<&str>,
        target_id: Option<&str>,
        aggregates: &[AggregateRow],
    ) -> SyncResult<ReconcileReport> {
        let (collection_id, state) = match (target_id, parent_id) {
            (Some(target), _) => (target.to_string(), TargetState::Verified),
            (None, Some(parent)) => self.locate_or_create(parent).await?,
            (None, None) => {
                return Err(SyncError::config(
                    "a parent page id or target database id is required",
                ))
            }
        };

        let schema_changes = match state {
            TargetState::Created => Vec::new(),
            TargetState::Verified => self.ensure_schema(&collection_id).await?,
        };

        let (created, updated) = self.upsert(&collection_id, aggregates).await?;
        info!(
            "Summary collection {}: {} created, {} updated",
            collection_id,
            created.len(),
            updated.len()
        );

        Ok(ReconcileReport {
            collection_id,
            state,
            schema_changes,
            created,
            updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthKey;
    use crate::store::memory::MemoryStore;
    use chrono::Month;

    const PARENT: &str = "parent-page";

    fn aggregate(year: i32, month: Month, average: f64) -> AggregateRow {
        AggregateRow {
            key: MonthKey::new(year, month),
            average,
            samples: 1,
        }
    }

    fn titled(id: &str, title: &str) -> RawRecord {
        RawRecord::new(id)
            .with(TITLE_PROPERTY, PropertyValue::Title(title.to_string()))
            .with("Average rnd", PropertyValue::Number(Some(0.0)))
            .with(DATE_PROPERTY, PropertyValue::Date(None))
    }

    #[test]
    fn test_expected_schema() {
        let schema = expected_schema("rnd");
        assert_eq!(schema.get("Name"), Some(&PropertyKind::Title));
        assert_eq!(schema.get("Date"), Some(&PropertyKind::Date));
        assert_eq!(schema.get("Average rnd"), Some(&PropertyKind::Number));
    }

    #[test]
    fn test_schema_changes_for_legacy_collection() {
        let mut current = FieldSchema::new();
        current.insert("Month".to_string(), PropertyKind::Title);
        current.insert("Average rnd".to_string(), PropertyKind::RichText);

        let changes = schema_changes(&current, "rnd");
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&SchemaChange::Rename {
            from: "Month".to_string(),
            to: "Name".to_string()
        }));
        assert!(changes.contains(&SchemaChange::Retype {
            name: "Average rnd".to_string(),
            kind: PropertyKind::Number
        }));
        assert!(changes.contains(&SchemaChange::Add {
            name: "Date".to_string(),
            kind: PropertyKind::Date
        }));
    }

    #[test]
    fn test_schema_changes_none_needed() {
        let mut current = expected_schema("rnd");
        current.insert("Notes".to_string(), PropertyKind::RichText);
        assert!(schema_changes(&current, "rnd").is_empty());
    }

    #[test]
    fn test_schema_changes_move_conflicting_name_aside() {
        let mut current = expected_schema("rnd");
        current.insert("Name".to_string(), PropertyKind::RichText);
        current.insert("Month".to_string(), PropertyKind::Title);
        current.insert("Name (previous)".to_string(), PropertyKind::Number);

        let changes = schema_changes(&current, "rnd");
        assert_eq!(
            changes,
            vec![
                SchemaChange::Rename {
                    from: "Name".to_string(),
                    to: "Name (previous) 2".to_string()
                },
                SchemaChange::Rename {
                    from: "Month".to_string(),
                    to: "Name".to_string()
                },
            ]
        );
        assert!(!changes.iter().any(|c| matches!(c, SchemaChange::Retype { .. })));
    }

    #[tokio::test]
    async fn test_ensure_schema_replaces_non_title_name() {
        let store = MemoryStore::new(10);
        let mut schema = FieldSchema::new();
        schema.insert("Month".to_string(), PropertyKind::Title);
        schema.insert("Name".to_string(), PropertyKind::RichText);
        schema.insert("Date".to_string(), PropertyKind::Date);
        schema.insert("Average rnd".to_string(), PropertyKind::Number);
        store.add_collection(PARENT, "db", "Monthly Aggregate Summary", schema);
        store.insert_record(
            "db",
            RawRecord::new("june")
                .with("Month", PropertyValue::Title("June 2025".to_string()))
                .with("Name", PropertyValue::RichText("note".to_string())),
        );

        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        reconciler.ensure_schema("db").await.unwrap();

        let schema = store.schema("db");
        assert_eq!(schema.get("Name"), Some(&PropertyKind::Title));
        assert_eq!(schema.get("Name (previous)"), Some(&PropertyKind::RichText));
        assert!(!schema.contains_key("Month"));

        let records = store.records("db");
        assert_eq!(
            records[0].property("Name"),
            Some(&PropertyValue::Title("June 2025".to_string()))
        );
        assert_eq!(
            records[0].property("Name (previous)"),
            Some(&PropertyValue::RichText("note".to_string()))
        );
    }

    #[test]
    fn test_build_lookup() {
        let records = vec![
            titled("a", "June 2025"),
            titled("b", ""),
            titled("c", "June 2025"),
            titled("d", "May 2025"),
        ];

        let lookup = Reconciler::<MemoryStore>::build_lookup(&records).unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.get("June 2025").map(String::as_str), Some("a"));
        assert_eq!(lookup.get("May 2025").map(String::as_str), Some("d"));
    }

    #[test]
    fn test_build_lookup_missing_title_property() {
        let records = vec![RawRecord::new("x").with("Month", PropertyValue::Title("June 2025".into()))];
        let result = Reconciler::<MemoryStore>::build_lookup(&records);
        assert!(matches!(result, Err(SyncError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn test_creates_collection_and_record() {
        let store = MemoryStore::new(10);
        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");

        let report = reconciler
            .reconcile(Some(PARENT), None, &[aggregate(2025, Month::June, 42.0)])
            .await
            .unwrap();

        assert_eq!(report.state, TargetState::Created);
        assert_eq!(report.created, vec!["June 2025".to_string()]);
        assert!(report.updated.is_empty());
        assert_eq!(store.schema(&report.collection_id), expected_schema("rnd"));

        let records = store.records(&report.collection_id);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.property("Name"),
            Some(&PropertyValue::Title("June 2025".to_string()))
        );
        assert_eq!(
            record.property("Average rnd"),
            Some(&PropertyValue::Number(Some(42.0)))
        );
        assert_eq!(
            record.property("Date"),
            Some(&PropertyValue::Date(Some("2025-06-01".to_string())))
        );
    }

    #[tokio::test]
    async fn test_second_run_only_updates() {
        let store = MemoryStore::new(2);
        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        let aggregates = vec![
            aggregate(2025, Month::February, 5.0),
            aggregate(2025, Month::January, 15.0),
            aggregate(2024, Month::December, 7.25),
        ];

        let first = reconciler
            .reconcile(Some(PARENT), None, &aggregates)
            .await
            .unwrap();
        assert_eq!(first.created.len(), 3);

        store.reset_calls();
        let second = reconciler
            .reconcile(Some(PARENT), None, &aggregates)
            .await
            .unwrap();

        assert_eq!(second.collection_id, first.collection_id);
        assert_eq!(second.state, TargetState::Verified);
        assert!(second.created.is_empty());
        assert_eq!(second.updated.len(), 3);
        assert!(second.schema_changes.is_empty());

        let calls = store.calls();
        assert_eq!(calls.collections_created, 0);
        assert_eq!(calls.records_created, 0);
        assert_eq!(calls.schema_updates, 0);
        assert_eq!(store.records(&first.collection_id).len(), 3);
        assert_eq!(store.collection_ids(), vec![first.collection_id.clone()]);
    }

    #[tokio::test]
    async fn test_revised_values_overwrite_in_place() {
        let store = MemoryStore::new(10);
        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");

        let first = reconciler
            .reconcile(Some(PARENT), None, &[aggregate(2025, Month::March, 1.0)])
            .await
            .unwrap();
        reconciler
            .reconcile(Some(PARENT), None, &[aggregate(2025, Month::March, 9.5)])
            .await
            .unwrap();

        let records = store.records(&first.collection_id);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].property("Average rnd"),
            Some(&PropertyValue::Number(Some(9.5)))
        );
        assert_eq!(
            records[0].property("Name"),
            Some(&PropertyValue::Title("March 2025".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reuses_collection_case_insensitively_and_repairs_schema() {
        let store = MemoryStore::new(10);
        store.add_block(PARENT, "para-1", "paragraph");
        let mut legacy = FieldSchema::new();
        legacy.insert("Month".to_string(), PropertyKind::Title);
        legacy.insert("Average rnd".to_string(), PropertyKind::Number);
        store.add_collection(PARENT, "legacy-db", "  monthly AGGREGATE summary ", legacy);
        store.insert_record(
            "legacy-db",
            RawRecord::new("old-june")
                .with("Month", PropertyValue::Title("June 2025".to_string()))
                .with("Average rnd", PropertyValue::Number(Some(1.0))),
        );

        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        let report = reconciler
            .reconcile(Some(PARENT), None, &[aggregate(2025, Month::June, 3.0)])
            .await
            .unwrap();

        assert_eq!(report.collection_id, "legacy-db");
        assert_eq!(report.state, TargetState::Verified);
        assert_eq!(report.schema_changes.len(), 2);
        assert_eq!(report.updated, vec!["June 2025".to_string()]);
        assert_eq!(store.schema("legacy-db"), expected_schema("rnd"));
        assert_eq!(store.calls().collections_created, 0);

        let records = store.records("legacy-db");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].property("Date"),
            Some(&PropertyValue::Date(Some("2025-06-01".to_string())))
        );
    }

    #[tokio::test]
    async fn test_untitled_records_are_recreated() {
        let store = MemoryStore::new(10);
        store.add_collection(PARENT, "db", "Monthly Aggregate Summary", expected_schema("rnd"));
        store.insert_record("db", titled("blank", ""));

        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        let report = reconciler
            .reconcile(None, Some("db"), &[aggregate(2025, Month::July, 2.0)])
            .await
            .unwrap();

        assert_eq!(report.created, vec!["July 2025".to_string()]);
        assert_eq!(store.records("db").len(), 2);
    }

    #[tokio::test]
    async fn test_requires_parent_or_target() {
        let store = MemoryStore::new(10);
        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        let result = reconciler.reconcile(None, None, &[]).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unknown_target_propagates_store_error() {
        let store = MemoryStore::new(10);
        let reconciler = Reconciler::new(&store, "rnd", "Monthly Aggregate Summary");
        let result = reconciler
            .reconcile(None, Some("nope"), &[aggregate(2025, Month::June, 1.0)])
            .await;
        assert!(matches!(result, Err(SyncError::Api { status: 404, .. })));
    }
}
