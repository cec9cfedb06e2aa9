// src/sink.rs
//! Output records and the sinks that receive them.
//!
//! A sink gets one ordered batch per `emit` call. Records are either raw feed
//! items, items wrapped with metadata, or event records tagged by `type`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::filter::{QueryFilter, StreamMode};
use crate::ingest::types::FeedItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Item(FeedItem),
    Wrapped(WrappedItem),
    Event(EventRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrappedItem {
    pub tweet: FeedItem,
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub stream_type: StreamMode,
    pub filter: QueryFilter,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_manual_trigger: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    StreamStart {
        message: String,
        filter: QueryFilter,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
    StreamError {
        error: String,
        timestamp: DateTime<Utc>,
    },
    ManualTriggerError {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl EventRecord {
    /// Value of the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            EventRecord::StreamStart { .. } => "stream_start",
            EventRecord::Error { .. } => "error",
            EventRecord::StreamError { .. } => "stream_error",
            EventRecord::ManualTriggerError { .. } => "manual_trigger_error",
        }
    }
}

impl Record {
    pub fn error(err: impl std::fmt::Display) -> Self {
        Record::Event(EventRecord::Error {
            error: err.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn stream_error(err: impl std::fmt::Display) -> Self {
        Record::Event(EventRecord::StreamError {
            error: err.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn manual_trigger_error(err: impl std::fmt::Display) -> Self {
        Record::Event(EventRecord::ManualTriggerError {
            error: err.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn stream_start(filter: &QueryFilter) -> Self {
        Record::Event(EventRecord::StreamStart {
            message: "Feed stream started".to_string(),
            filter: filter.clone(),
            timestamp: Utc::now(),
        })
    }

    /// The feed item carried by this record, if any.
    pub fn item(&self) -> Option<&FeedItem> {
        match self {
            Record::Item(it) => Some(it),
            Record::Wrapped(w) => Some(&w.tweet),
            Record::Event(_) => None,
        }
    }

    pub fn event_kind(&self) -> Option<&'static str> {
        match self {
            Record::Event(ev) => Some(ev.kind()),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, batch: Vec<Record>) -> Result<()>;
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().expect("sink mutex poisoned").clone()
    }

    /// All records, flattened in emission order.
    pub fn records(&self) -> Vec<Record> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait::async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, batch: Vec<Record>) -> Result<()> {
        self.batches.lock().expect("sink mutex poisoned").push(batch);
        Ok(())
    }
}

/// Forwards batches to an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<Record>>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<Record>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, batch: Vec<Record>) -> Result<()> {
        self.tx
            .send(batch)
            .map_err(|_| anyhow!("sink channel closed"))
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    async fn emit(&self, batch: Vec<Record>) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("json lines sink poisoned"))?;
        for rec in &batch {
            serde_json::to_writer(&mut *out, rec).context("serializing record")?;
            out.write_all(b"\n").context("writing record")?;
        }
        out.flush().context("flushing records")
    }
}
