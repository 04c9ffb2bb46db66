//! Full-collection fetch over a paginated query.

use crate::error::{SyncError, SyncResult};
use crate::models::RawRecord;
use crate::store::RecordStore;
use tracing::debug;

/// Fetch every record of a collection, following continuation cursors until
/// the store reports no more data. Order is preserved across pages.
pub async fn fetch_all_records<S>(store: &S, collection_id: &str) -> SyncResult<Vec<RawRecord>>
where
    S: RecordStore + ?Sized,
{
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store
            .query_collection(collection_id, cursor.as_deref())
            .await?;
        pages += 1;
        debug!(
            "Fetched page {} of {} ({} records)",
            pages,
            collection_id,
            page.records.len()
        );
        records.extend(page.records);

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(SyncError::Protocol(format!(
                    "query of {} reported more results without a cursor",
                    collection_id
                )))
            }
        }
    }

    Ok(records)
}
