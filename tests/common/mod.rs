// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use feed_trigger::filter::QueryFilter;
use feed_trigger::ingest::types::{FeedItem, FeedProvider, StreamSession, UserRecord};
use feed_trigger::sink::{EventSink, Record};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn item(id: &str) -> FeedItem {
    let n: i64 = id.parse().unwrap_or(0);
    FeedItem::new(id, Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap())
}

pub fn items(ids: &[&str]) -> Vec<FeedItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.item().map(|i| i.id.clone()))
        .collect()
}

/// Answers search/timeline calls from a script; once the script is used up it
/// keeps returning the last successful page.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Vec<FeedItem>, String>>>,
    last_page: Mutex<Vec<FeedItem>>,
    pub users: Vec<UserRecord>,
    pub fetch_calls: AtomicUsize,
    pub last_limit: AtomicUsize,
    pub last_filter: Mutex<Option<QueryFilter>>,
    /// Never answer search/timeline calls.
    pub hang: bool,
    session: Mutex<Option<Box<dyn StreamSession>>>,
}

impl ScriptedProvider {
    pub fn with_pages(pages: Vec<Result<Vec<FeedItem>, String>>) -> Self {
        Self {
            script: Mutex::new(pages.into()),
            ..Self::default()
        }
    }

    pub fn with_session(session: impl StreamSession + 'static) -> Self {
        let p = Self::default();
        *p.session.lock().unwrap() = Some(Box::new(session));
        p
    }

    fn next_page(&self, limit: usize) -> Result<Vec<FeedItem>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(page)) => {
                *self.last_page.lock().unwrap() = page.clone();
                Ok(page)
            }
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(self.last_page.lock().unwrap().clone()),
        }
    }
}

#[async_trait]
impl FeedProvider for ScriptedProvider {
    async fn search(&self, filter: &QueryFilter, limit: usize) -> Result<Vec<FeedItem>> {
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        if self.hang {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        self.next_page(limit)
    }

    fn stream(&self, _filter: &QueryFilter, _interval: Duration) -> Result<Box<dyn StreamSession>> {
        self.session
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("stream already taken"))
    }

    async fn user_details(&self, handle: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.user_name == handle)
            .cloned())
    }

    async fn timeline(&self, _user_id: &str, limit: usize) -> Result<Vec<FeedItem>> {
        self.next_page(limit)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Session over a fixed script that records pulls and release.
pub struct ScriptedSession {
    script: VecDeque<Result<FeedItem, String>>,
    /// Block forever once the script is exhausted instead of ending.
    pub hang_when_empty: bool,
    pub fail_close: bool,
    pub pulled: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn new(script: Vec<Result<FeedItem, String>>) -> Self {
        Self {
            script: script.into(),
            hang_when_empty: false,
            fail_close: false,
            pulled: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl StreamSession for ScriptedSession {
    async fn next(&mut self) -> Option<Result<FeedItem>> {
        match self.script.pop_front() {
            Some(step) => {
                self.pulled.fetch_add(1, Ordering::SeqCst);
                Some(step.map_err(|m| anyhow!(m)))
            }
            None if self.hang_when_empty => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(anyhow!("release failed"));
        }
        Ok(())
    }
}

/// Rejects any batch that carries feed items; event records pass.
#[derive(Default)]
pub struct RejectingSink {
    pub accepted: Mutex<Vec<Record>>,
}

#[async_trait]
impl EventSink for RejectingSink {
    async fn emit(&self, batch: Vec<Record>) -> Result<()> {
        if batch.iter().any(|r| r.item().is_some()) {
            return Err(anyhow!("downstream unavailable"));
        }
        self.accepted.lock().unwrap().extend(batch);
        Ok(())
    }
}
