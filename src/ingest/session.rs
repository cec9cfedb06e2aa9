// src/ingest/session.rs
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::filter::QueryFilter;
use crate::ingest::dedup::dedupe;
use crate::ingest::types::{FeedItem, FeedProvider, StreamSession};

/// Page size of each search behind a polled session.
const STREAM_PAGE_SIZE: usize = 20;

/// Streaming emulated by repeated searches, for providers without a push API.
///
/// The first page only seeds the session cursor, so the session yields what
/// shows up after it was opened. A failed search ends the session.
pub struct PolledSession {
    provider: Arc<dyn FeedProvider>,
    filter: QueryFilter,
    interval: Duration,
    buffer: VecDeque<FeedItem>,
    cursor: Option<String>,
    primed: bool,
    finished: bool,
}

impl PolledSession {
    pub fn new(provider: Arc<dyn FeedProvider>, filter: QueryFilter, interval: Duration) -> Self {
        Self {
            provider,
            filter,
            interval,
            buffer: VecDeque::new(),
            cursor: None,
            primed: false,
            finished: false,
        }
    }
}

#[async_trait::async_trait]
impl StreamSession for PolledSession {
    async fn next(&mut self) -> Option<Result<FeedItem>> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.primed {
                tokio::time::sleep(self.interval).await;
            }

            let batch = match self.provider.search(&self.filter, STREAM_PAGE_SIZE).await {
                Ok(b) => b,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            if !self.primed {
                self.primed = true;
                self.cursor = batch.first().map(|it| it.id.clone());
                tracing::debug!(
                    provider = self.provider.name(),
                    seeded = ?self.cursor,
                    "polled stream primed"
                );
                continue;
            }

            let fresh = dedupe(batch, self.cursor.as_deref());
            if let Some(newest) = fresh.last() {
                self.cursor = Some(newest.id.clone());
            }
            self.buffer.extend(fresh);
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.finished = true;
        self.buffer.clear();
        Ok(())
    }
}
