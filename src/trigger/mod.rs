// src/trigger/mod.rs
//! Activation lifecycle: build a driver from config, run it on its own task,
//! shut it down on request.

pub mod poll;
pub mod stream;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{TriggerConfig, TriggerMode};
use crate::error::{FetchError, ValidationError};
use crate::filter::{build, build_poll_target};
use crate::ingest::{Cursor, FeedItem, FeedProvider, StateStore};
use crate::sink::EventSink;

pub use poll::{CycleOutcome, PollLoop, PollState};
pub use stream::{StreamConsumer, StreamEnd, StreamOptions};

/// The two mutually exclusive ways of driving an activation.
#[derive(Clone)]
pub enum Driver {
    Poll(Arc<PollLoop>),
    Stream(Arc<StreamConsumer>),
}

impl Driver {
    /// Validate the mode-specific inputs and wire the driver. Nothing runs yet.
    pub fn from_config(
        cfg: &TriggerConfig,
        provider: Arc<dyn FeedProvider>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ValidationError> {
        match cfg.mode {
            TriggerMode::Poll => {
                let target = build_poll_target(cfg.poll.trigger_on, &cfg.poll.inputs)?;
                Ok(Driver::Poll(Arc::new(PollLoop::new(
                    cfg.instance_id.clone(),
                    target,
                    cfg.poll.interval(),
                    cfg.poll.max_results,
                    provider,
                    sink,
                    Cursor::scoped(store, &cfg.instance_id),
                ))))
            }
            TriggerMode::Stream => {
                let filter = build(cfg.stream.stream_type, &cfg.stream.inputs)?;
                Ok(Driver::Stream(Arc::new(StreamConsumer::new(
                    cfg.instance_id.clone(),
                    cfg.stream.stream_type,
                    filter,
                    cfg.stream.interval(),
                    StreamOptions {
                        include_metadata: cfg.stream.include_metadata,
                        include_start_message: cfg.stream.include_start_message,
                    },
                    provider,
                    sink,
                ))))
            }
        }
    }

    pub async fn manual_trigger(&self) -> Result<Vec<FeedItem>, FetchError> {
        match self {
            Driver::Poll(p) => p.manual_trigger().await,
            Driver::Stream(s) => s.manual_trigger().await,
        }
    }
}

/// A running trigger. Dropping it without `close` leaves the task running until
/// the runtime shuts down.
pub struct Activation {
    driver: Driver,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Activation {
    pub fn start(driver: Driver) -> Self {
        let cancel = CancellationToken::new();
        let task = match &driver {
            Driver::Poll(p) => {
                let p = Arc::clone(p);
                let cancel = cancel.clone();
                tokio::spawn(async move { p.run(cancel).await })
            }
            Driver::Stream(s) => {
                let s = Arc::clone(s);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    s.run(cancel).await;
                })
            }
        };
        Self {
            driver,
            cancel,
            task: Some(task),
        }
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Resolves when the driver stops on its own (e.g. a stream failure).
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                tracing::warn!(target: "trigger", error = ?e, "trigger task ended abnormally");
            }
            self.task = None;
        }
    }

    pub async fn manual_trigger(&self) -> Result<Vec<FeedItem>, FetchError> {
        self.driver.manual_trigger().await
    }

    /// Cancel and wait until the loop has released its timer and stream session.
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.finished().await;
        tracing::info!(target: "trigger", "activation closed");
    }
}

/// Validate, wire and start in one go.
pub fn activate(
    cfg: &TriggerConfig,
    provider: Arc<dyn FeedProvider>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
) -> Result<Activation, ValidationError> {
    let driver = Driver::from_config(cfg, provider, store, sink)?;
    Ok(Activation::start(driver))
}
