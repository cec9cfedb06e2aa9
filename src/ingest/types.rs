// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::filter::QueryFilter;

/// One post as delivered by a provider. Only `id` is required; `created_at` is
/// kept as delivered and parsed on demand, everything else passes through untouched.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Twitter-style `Wed Oct 10 20:19:24 +0000 2018`.
const LEGACY_TS_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

impl FeedItem {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: Some(serde_json::Value::String(created_at.to_rfc3339())),
            extra: serde_json::Map::new(),
        }
    }

    /// Creation time if the provider sent one we can read: RFC 3339, the legacy
    /// Twitter format, or unix seconds. `None` otherwise.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.created_at.as_ref()? {
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_str(s, LEGACY_TS_FORMAT))
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            serde_json::Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(alias = "user_name")]
    pub user_name: String,
}

/// Remote feed. Batches come back newest-first.
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn search(&self, filter: &QueryFilter, limit: usize) -> Result<Vec<FeedItem>>;

    /// Open a lazy, unbounded session. `interval` is a hint for providers that
    /// implement streaming by polling.
    fn stream(&self, filter: &QueryFilter, interval: Duration) -> Result<Box<dyn StreamSession>>;

    async fn user_details(&self, handle: &str) -> Result<Option<UserRecord>>;

    async fn timeline(&self, user_id: &str, limit: usize) -> Result<Vec<FeedItem>>;

    fn name(&self) -> &'static str;
}

/// Pull iterator over a provider stream with an explicit release step.
///
/// `next` yields `None` at end of sequence. After an `Err` the session is
/// finished and only `close` may be called.
#[async_trait::async_trait]
pub trait StreamSession: Send {
    async fn next(&mut self) -> Option<Result<FeedItem>>;
    async fn close(&mut self) -> Result<()>;
}
