// src/trigger/stream.rs
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::filter::{QueryFilter, StreamMode};
use crate::ingest::{ensure_metrics_described, FeedItem, FeedProvider};
use crate::sink::{EventSink, ItemMetadata, Record, WrappedItem};

/// Result count of a manual stream-mode run.
pub const MANUAL_TRIGGER_LIMIT: usize = 5;

/// How a consumption run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    /// Provider signalled end of sequence.
    Exhausted,
    /// Provider failed; a `stream_error` record was emitted.
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    pub include_metadata: bool,
    pub include_start_message: bool,
}

/// Forwards every item of one provider session to the sink.
///
/// There is no restart: after a provider failure the activation has to be
/// started again.
pub struct StreamConsumer {
    instance_id: String,
    mode: StreamMode,
    filter: QueryFilter,
    interval: Duration,
    options: StreamOptions,
    provider: Arc<dyn FeedProvider>,
    sink: Arc<dyn EventSink>,
}

impl StreamConsumer {
    pub fn new(
        instance_id: impl Into<String>,
        mode: StreamMode,
        filter: QueryFilter,
        interval: Duration,
        options: StreamOptions,
        provider: Arc<dyn FeedProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            mode,
            filter,
            interval,
            options,
            provider,
            sink,
        }
    }

    /// Consume until cancelled, exhausted or failed. The session is always
    /// closed before returning; a failing close is logged and swallowed.
    pub async fn run(&self, cancel: CancellationToken) -> StreamEnd {
        ensure_metrics_described();

        if self.options.include_start_message {
            self.report(Record::stream_start(&self.filter)).await;
        }

        let mut session = match self.provider.stream(&self.filter, self.interval) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "trigger", instance = %self.instance_id, error = ?e, "stream open failed");
                counter!("trigger_fetch_errors_total", "mode" => "stream").increment(1);
                self.report(Record::stream_error(format!("{e:#}"))).await;
                return StreamEnd::Failed;
            }
        };
        tracing::info!(
            target: "trigger",
            instance = %self.instance_id,
            provider = self.provider.name(),
            mode = ?self.mode,
            "stream session opened"
        );

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                n = session.next() => n,
            };

            match next {
                None => break StreamEnd::Exhausted,
                Some(Ok(item)) => {
                    counter!("trigger_stream_items_total").increment(1);
                    let id = item.id.clone();
                    match self.sink.emit(vec![self.wrap(item, false)]).await {
                        Ok(()) => {
                            counter!("trigger_items_emitted_total", "mode" => "stream").increment(1)
                        }
                        Err(e) => {
                            tracing::warn!(target: "trigger", instance = %self.instance_id, item = %id, error = ?e, "item emit failed");
                            self.report(Record::error(format!("{e:#}"))).await;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(target: "trigger", instance = %self.instance_id, error = ?e, "stream failed");
                    counter!("trigger_fetch_errors_total", "mode" => "stream").increment(1);
                    self.report(Record::stream_error(format!("{e:#}"))).await;
                    break StreamEnd::Failed;
                }
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!(target: "trigger", instance = %self.instance_id, error = ?e, "error closing stream session");
        }
        tracing::info!(target: "trigger", instance = %self.instance_id, end = ?end, "stream consumer stopped");
        end
    }

    /// One search of `MANUAL_TRIGGER_LIMIT` items with the activation's filter.
    pub async fn manual_trigger(&self) -> Result<Vec<FeedItem>, FetchError> {
        match self.provider.search(&self.filter, MANUAL_TRIGGER_LIMIT).await {
            Ok(items) => {
                let batch = items.iter().map(|it| self.wrap(it.clone(), true)).collect();
                if let Err(e) = self.sink.emit(batch).await {
                    tracing::warn!(error = ?e, "manual trigger emit failed");
                }
                Ok(items)
            }
            Err(e) => {
                tracing::warn!(target: "trigger", instance = %self.instance_id, error = ?e, "manual trigger failed");
                self.report(Record::manual_trigger_error(format!("{e:#}"))).await;
                Err(FetchError::Provider(e))
            }
        }
    }

    fn wrap(&self, item: FeedItem, manual: bool) -> Record {
        if !self.options.include_metadata {
            return Record::Item(item);
        }
        Record::Wrapped(WrappedItem {
            tweet: item,
            metadata: ItemMetadata {
                stream_type: self.mode,
                filter: self.filter.clone(),
                received_at: Utc::now(),
                is_manual_trigger: manual.then_some(true),
            },
        })
    }

    async fn report(&self, rec: Record) {
        if let Err(e) = self.sink.emit(vec![rec]).await {
            tracing::warn!(instance = %self.instance_id, error = ?e, "could not emit record");
        }
    }
}
