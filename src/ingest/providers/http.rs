use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::filter::QueryFilter;
use crate::ingest::session::PolledSession;
use crate::ingest::types::{FeedItem, FeedProvider, StreamSession, UserRecord};

/// Page envelope returned by the feed API.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    list: Vec<FeedItem>,
}

/// JSON feed API over HTTP.
///
/// - `GET {base}/tweets/search?filter=<json>&count=<n>` returns `{"list": [...]}`
/// - `GET {base}/users/{handle}` returns a user, 404 when unknown
/// - `GET {base}/users/{id}/timeline?count=<n>` returns `{"list": [...]}`
#[derive(Clone)]
pub struct HttpProvider {
    base: Url,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid base url {base_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("base url {base_url} cannot carry a path"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feed-trigger/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_page(&self, url: Url, query: &[(&str, String)]) -> Result<Vec<FeedItem>> {
        let page: Page = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?
            .json()
            .await
            .with_context(|| format!("decoding page from {url}"))?;
        Ok(page.list)
    }
}

#[async_trait]
impl FeedProvider for HttpProvider {
    async fn search(&self, filter: &QueryFilter, limit: usize) -> Result<Vec<FeedItem>> {
        let filter_json = serde_json::to_string(filter).context("encoding filter")?;
        let url = self.endpoint(&["tweets", "search"]);
        self.get_page(url, &[("filter", filter_json), ("count", limit.to_string())])
            .await
    }

    fn stream(&self, filter: &QueryFilter, interval: Duration) -> Result<Box<dyn StreamSession>> {
        Ok(Box::new(PolledSession::new(
            Arc::new(self.clone()),
            filter.clone(),
            interval,
        )))
    }

    async fn user_details(&self, handle: &str) -> Result<Option<UserRecord>> {
        let url = self.endpoint(&["users", handle]);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let user = resp
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?
            .json()
            .await
            .with_context(|| format!("decoding user from {url}"))?;
        Ok(Some(user))
    }

    async fn timeline(&self, user_id: &str, limit: usize) -> Result<Vec<FeedItem>> {
        let url = self.endpoint(&["users", user_id, "timeline"]);
        self.get_page(url, &[("count", limit.to_string())]).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
