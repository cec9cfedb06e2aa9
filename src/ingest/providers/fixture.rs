use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::filter::QueryFilter;
use crate::ingest::session::PolledSession;
use crate::ingest::types::{FeedItem, FeedProvider, StreamSession, UserRecord};

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    items: Vec<FeedItem>,
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Offline provider backed by a JSON file:
/// `{"items": [{"id": "1", "createdAt": "..."}], "users": [{"id": "9", "userName": "alice"}]}`.
///
/// The file is re-read on every call, so editing it while a trigger runs
/// simulates a live feed. Search filters are not evaluated; timelines select
/// items whose `authorId` matches.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    path: PathBuf,
}

impl FixtureProvider {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Fixture> {
        let s = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading fixture {}", self.path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parsing fixture {}", self.path.display()))
    }
}

/// Undated items sort as oldest; the sort is stable, so file order breaks ties.
fn newest_first(mut items: Vec<FeedItem>, limit: usize) -> Vec<FeedItem> {
    items.sort_by_key(|it| std::cmp::Reverse(it.timestamp()));
    items.truncate(limit);
    items
}

#[async_trait]
impl FeedProvider for FixtureProvider {
    async fn search(&self, _filter: &QueryFilter, limit: usize) -> Result<Vec<FeedItem>> {
        Ok(newest_first(self.load().await?.items, limit))
    }

    fn stream(&self, filter: &QueryFilter, interval: Duration) -> Result<Box<dyn StreamSession>> {
        Ok(Box::new(PolledSession::new(
            Arc::new(self.clone()),
            filter.clone(),
            interval,
        )))
    }

    async fn user_details(&self, handle: &str) -> Result<Option<UserRecord>> {
        let fixture = self.load().await?;
        Ok(fixture
            .users
            .into_iter()
            .find(|u| u.user_name.eq_ignore_ascii_case(handle)))
    }

    async fn timeline(&self, user_id: &str, limit: usize) -> Result<Vec<FeedItem>> {
        let items = self
            .load()
            .await?
            .items
            .into_iter()
            .filter(|it| it.extra.get("authorId").and_then(|v| v.as_str()) == Some(user_id))
            .collect();
        Ok(newest_first(items, limit))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
