// src/ingest/dedup.rs
use crate::ingest::types::FeedItem;

/// Reduce a newest-first batch to the items newer than `cursor`, oldest first.
///
/// Without a cursor every item counts as new. When the cursor id is not in the
/// batch (the gap outgrew the page, or the cursor item vanished) the whole batch
/// is also treated as new; the feed has no total order to do better with.
pub fn dedupe(mut batch: Vec<FeedItem>, cursor: Option<&str>) -> Vec<FeedItem> {
    if let Some(last) = cursor {
        if let Some(pos) = batch.iter().position(|it| it.id == last) {
            batch.truncate(pos);
        }
    }
    batch.reverse();
    batch
}
