// src/trigger/poll.rs
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::filter::PollTarget;
use crate::ingest::{dedupe, ensure_metrics_described, Cursor, FeedItem, FeedProvider};
use crate::sink::{EventSink, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `count` items reached the sink and the cursor moved to `cursor`.
    Emitted { count: usize, cursor: String },
    /// Nothing newer than the cursor.
    Empty,
    /// Fetch or hand-off failed; the cursor did not move.
    Failed,
    Cancelled,
}

/// Fixed-interval poller: one fetch right away, then sleep + fetch until cancelled.
///
/// Cycles never overlap. A failed cycle is reported, logged and retried on the next
/// tick; there is no backoff.
pub struct PollLoop {
    instance_id: String,
    target: PollTarget,
    interval: Duration,
    max_results: usize,
    provider: Arc<dyn FeedProvider>,
    sink: Arc<dyn EventSink>,
    cursor: Cursor,
    state: watch::Sender<PollState>,
}

impl PollLoop {
    pub fn new(
        instance_id: impl Into<String>,
        target: PollTarget,
        interval: Duration,
        max_results: usize,
        provider: Arc<dyn FeedProvider>,
        sink: Arc<dyn EventSink>,
        cursor: Cursor,
    ) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            instance_id: instance_id.into(),
            target,
            interval,
            max_results,
            provider,
            sink,
            cursor,
            state,
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Run until `cancel` fires. An in-flight fetch or sleep is abandoned at once.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            target: "trigger",
            instance = %self.instance_id,
            provider = self.provider.name(),
            interval_ms = self.interval.as_millis() as u64,
            "poll loop started"
        );

        loop {
            self.state.send_replace(PollState::Polling);
            if self.poll_once(&cancel).await == CycleOutcome::Cancelled || cancel.is_cancelled() {
                break;
            }

            self.state.send_replace(PollState::Sleeping);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.send_replace(PollState::Stopped);
        tracing::info!(target: "trigger", instance = %self.instance_id, "poll loop stopped");
    }

    /// One fetch-dedupe-emit pass against the stored cursor.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> CycleOutcome {
        ensure_metrics_described();

        let fresh = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Cancelled,
            r = self.fetch_unseen() => r,
        };

        let outcome = match fresh {
            Ok(items) => self.hand_off(items).await,
            Err(e) => {
                tracing::warn!(
                    target: "trigger",
                    instance = %self.instance_id,
                    error = %e,
                    "poll cycle failed"
                );
                counter!("trigger_fetch_errors_total", "mode" => "poll").increment(1);
                if let Err(sink_err) = self.sink.emit(vec![Record::error(&e)]).await {
                    tracing::warn!(error = ?sink_err, "could not report poll failure");
                }
                CycleOutcome::Failed
            }
        };

        let label = match outcome {
            CycleOutcome::Emitted { .. } => "emitted",
            CycleOutcome::Empty => "empty",
            CycleOutcome::Failed => "failed",
            CycleOutcome::Cancelled => "cancelled",
        };
        counter!("trigger_poll_cycles_total", "outcome" => label).increment(1);
        gauge!("trigger_last_poll_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        outcome
    }

    /// One bounded fetch for manual runs. Emits what was fetched, in fetch order,
    /// and leaves the cursor and loop state alone.
    pub async fn manual_trigger(&self) -> Result<Vec<FeedItem>, FetchError> {
        match self.fetch().await {
            Ok(items) => {
                let batch = items.iter().cloned().map(Record::Item).collect();
                if let Err(e) = self.sink.emit(batch).await {
                    tracing::warn!(error = ?e, "manual trigger emit failed");
                }
                Ok(items)
            }
            Err(e) => {
                tracing::warn!(target: "trigger", instance = %self.instance_id, error = %e, "manual trigger failed");
                if let Err(sink_err) = self.sink.emit(vec![Record::manual_trigger_error(&e)]).await {
                    tracing::warn!(error = ?sink_err, "could not report manual trigger failure");
                }
                Err(e)
            }
        }
    }

    async fn fetch_unseen(&self) -> Result<Vec<FeedItem>, FetchError> {
        let last = self.cursor.load().await.map_err(FetchError::Cursor)?;
        let batch = self.fetch().await?;
        Ok(dedupe(batch, last.as_deref()))
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        let t0 = Instant::now();
        let res = match &self.target {
            PollTarget::Search(filter) => self
                .provider
                .search(filter, self.max_results)
                .await
                .map_err(FetchError::Provider),
            PollTarget::Timeline { username } => {
                let user = self
                    .provider
                    .user_details(username)
                    .await
                    .map_err(FetchError::Provider)?
                    .ok_or_else(|| FetchError::UserNotFound(username.clone()))?;
                self.provider
                    .timeline(&user.id, self.max_results)
                    .await
                    .map_err(FetchError::Provider)
            }
        };
        histogram!("trigger_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        res
    }

    async fn hand_off(&self, fresh: Vec<FeedItem>) -> CycleOutcome {
        let Some(newest) = fresh.last().map(|it| it.id.clone()) else {
            tracing::debug!(target: "trigger", instance = %self.instance_id, "no new items");
            return CycleOutcome::Empty;
        };
        let count = fresh.len();

        let batch = fresh.into_iter().map(Record::Item).collect();
        if let Err(e) = self.sink.emit(batch).await {
            tracing::warn!(
                target: "trigger",
                instance = %self.instance_id,
                error = ?e,
                "sink rejected batch; cursor not advanced"
            );
            return CycleOutcome::Failed;
        }
        counter!("trigger_items_emitted_total", "mode" => "poll").increment(count as u64);

        // Emission already happened; a failed write only risks re-delivery next cycle.
        if let Err(e) = self.cursor.advance(&newest).await {
            tracing::warn!(
                target: "trigger",
                instance = %self.instance_id,
                error = ?e,
                "cursor write failed"
            );
        }

        tracing::info!(
            target: "trigger",
            instance = %self.instance_id,
            count,
            cursor = %newest,
            "poll cycle emitted"
        );
        CycleOutcome::Emitted {
            count,
            cursor: newest,
        }
    }
}
