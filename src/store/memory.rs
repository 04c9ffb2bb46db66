//! In-memory record store for tests.

use super::{PropertyMap, RecordStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{ChildBlock, FieldSchema, QueryPage, RawRecord, SchemaChange};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Collection {
    schema: FieldSchema,
    records: Vec<RawRecord>,
}

#[derive(Debug, Default)]
struct State {
    children: HashMap<String, Vec<ChildBlock>>,
    collections: HashMap<String, Collection>,
    next_id: usize,
    /// Report `has_more` without a continuation cursor.
    drop_cursors: bool,
}

/// Call counters, for asserting how the pipeline used the store.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Calls {
    pub queries: usize,
    pub collections_created: usize,
    pub schema_updates: usize,
    pub records_created: usize,
    pub records_updated: usize,
}

/// A store that keeps collections in memory and pages query results.
pub struct MemoryStore {
    page_size: usize,
    state: Mutex<State>,
    calls: Mutex<Calls>,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(State::default()),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Register a collection under a parent page, listed as a child block.
    pub fn add_collection(&self, parent_id: &str, id: &str, title: &str, schema: FieldSchema) {
        let mut state = self.state.lock().unwrap();
        state
            .children
            .entry(parent_id.to_string())
            .or_default()
            .push(ChildBlock {
                id: id.to_string(),
                block_type: "child_database".to_string(),
                title: Some(title.to_string()),
            });
        state.collections.insert(
            id.to_string(),
            Collection {
                schema,
                records: Vec::new(),
            },
        );
    }

    /// Add a non-collection block under a parent page.
    pub fn add_block(&self, parent_id: &str, id: &str, block_type: &str) {
        self.state
            .lock()
            .unwrap()
            .children
            .entry(parent_id.to_string())
            .or_default()
            .push(ChildBlock {
                id: id.to_string(),
                block_type: block_type.to_string(),
                title: None,
            });
    }

    pub fn insert_record(&self, collection_id: &str, record: RawRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .collections
            .get_mut(collection_id)
            .expect("collection exists")
            .records
            .push(record);
    }

    pub fn records(&self, collection_id: &str) -> Vec<RawRecord> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    pub fn schema(&self, collection_id: &str) -> FieldSchema {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .map(|c| c.schema.clone())
            .unwrap_or_default()
    }

    pub fn collection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .collections
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Make every later query omit its continuation cursor.
    pub fn drop_cursors(&self) {
        self.state.lock().unwrap().drop_cursors = true;
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        *self.calls.lock().unwrap() = Calls::default();
    }

    fn not_found(id: &str) -> SyncError {
        SyncError::Api {
            status: 404,
            code: "object_not_found".to_string(),
            message: format!("Could not find object with ID: {}", id),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_collection_children(&self, parent_id: &str) -> SyncResult<Vec<ChildBlock>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .children
            .get(parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_collection(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> SyncResult<QueryPage> {
        self.calls.lock().unwrap().queries += 1;

        let state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get(collection_id)
            .ok_or_else(|| Self::not_found(collection_id))?;

        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| SyncError::Protocol(format!("bad cursor {}", c)))?,
            None => 0,
        };
        let end = (start + self.page_size).min(collection.records.len());
        let has_more = end < collection.records.len();

        Ok(QueryPage {
            records: collection.records[start.min(end)..end].to_vec(),
            has_more,
            next_cursor: (has_more && !state.drop_cursors).then(|| end.to_string()),
        })
    }

    async fn get_collection_schema(&self, collection_id: &str) -> SyncResult<FieldSchema> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .map(|c| c.schema.clone())
            .ok_or_else(|| Self::not_found(collection_id))
    }

    async fn create_collection(
        &self,
        parent_id: &str,
        title: &str,
        schema: &FieldSchema,
    ) -> SyncResult<String> {
        self.calls.lock().unwrap().collections_created += 1;

        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            format!("collection-{}", state.next_id)
        };
        self.add_collection(parent_id, &id, title, schema.clone());
        Ok(id)
    }

    async fn update_collection_schema(
        &self,
        collection_id: &str,
        changes: &[SchemaChange],
    ) -> SyncResult<()> {
        self.calls.lock().unwrap().schema_updates += 1;

        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| Self::not_found(collection_id))?;

        for change in changes {
            match change {
                SchemaChange::Add { name, kind } | SchemaChange::Retype { name, kind } => {
                    collection.schema.insert(name.clone(), kind.clone());
                }
                SchemaChange::Rename { from, to } => {
                    if let Some(kind) = collection.schema.remove(from) {
                        collection.schema.insert(to.clone(), kind);
                    }
                    for record in &mut collection.records {
                        if let Some(value) = record.properties.remove(from) {
                            record.properties.insert(to.clone(), value);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn create_record(
        &self,
        collection_id: &str,
        properties: &PropertyMap,
    ) -> SyncResult<String> {
        self.calls.lock().unwrap().records_created += 1;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("record-{}", state.next_id);
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| Self::not_found(collection_id))?;

        collection.records.push(RawRecord {
            id: id.clone(),
            properties: properties.clone(),
        });
        Ok(id)
    }

    async fn update_record(&self, record_id: &str, properties: &PropertyMap) -> SyncResult<()> {
        self.calls.lock().unwrap().records_updated += 1;

        let mut state = self.state.lock().unwrap();
        let record = state
            .collections
            .values_mut()
            .flat_map(|c| c.records.iter_mut())
            .find(|r| r.id == record_id)
            .ok_or_else(|| Self::not_found(record_id))?;

        for (name, value) in properties {
            record.properties.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}
