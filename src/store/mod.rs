//! Record store access.
//!
//! The pipeline talks to the remote store only through [`RecordStore`].
//! `NotionClient` implements it over the Notion REST API; tests use the
//! in-memory `MemoryStore`.

#[cfg(test)]
pub mod memory;
pub mod notion;

pub use notion::{NotionClient, NotionConfig};

use crate::error::SyncResult;
use crate::models::{ChildBlock, FieldSchema, PropertyValue, QueryPage, SchemaChange};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Properties to write on a record, keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Remote operations the pipeline depends on.
///
/// Calls are made one at a time; implementations make a single attempt and
/// surface failures unchanged.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Immediate child blocks of a container, in order.
    async fn list_collection_children(&self, parent_id: &str) -> SyncResult<Vec<ChildBlock>>;

    /// One page of records, starting at `cursor` (or the beginning).
    async fn query_collection(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> SyncResult<QueryPage>;

    async fn get_collection_schema(&self, collection_id: &str) -> SyncResult<FieldSchema>;

    /// Create a collection under `parent_id` and return its id.
    async fn create_collection(
        &self,
        parent_id: &str,
        title: &str,
        schema: &FieldSchema,
    ) -> SyncResult<String>;

    async fn update_collection_schema(
        &self,
        collection_id: &str,
        changes: &[SchemaChange],
    ) -> SyncResult<()>;

    /// Create a record and return its id.
    async fn create_record(&self, collection_id: &str, properties: &PropertyMap)
        -> SyncResult<String>;

    async fn update_record(&self, record_id: &str, properties: &PropertyMap) -> SyncResult<()>;
}
