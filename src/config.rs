// src/config.rs
//! Trigger configuration: TOML or JSON, located via explicit path, env var or fallbacks.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::filter::{PollInputs, PollMode, RawInputs, StreamMode};
use crate::ingest::providers::{FixtureProvider, HttpProvider};
use crate::ingest::{FeedProvider, JsonFileStore, MemoryStore, StateStore};

pub const ENV_CONFIG_PATH: &str = "FEED_TRIGGER_CONFIG";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_STREAM_INTERVAL_MS: u64 = 60_000;
const DEFAULT_MAX_RESULTS: usize = 10;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

fn default_instance_id() -> String {
    "default".to_string()
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Poll,
    Stream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default)]
    pub mode: TriggerMode,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub trigger_on: PollMode,
    #[serde(flatten)]
    pub inputs: PollInputs,
    pub poll_interval_secs: u64,
    pub max_results: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            trigger_on: PollMode::default(),
            inputs: PollInputs::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub stream_type: StreamMode,
    #[serde(flatten)]
    pub inputs: RawInputs,
    pub polling_interval_ms: u64,
    pub include_metadata: bool,
    #[serde(default = "default_true")]
    pub include_start_message: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            stream_type: StreamMode::default(),
            inputs: RawInputs::default(),
            polling_interval_ms: DEFAULT_STREAM_INTERVAL_MS,
            include_metadata: false,
            include_start_message: true,
        }
    }
}

impl StreamSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Http {
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Fixture {
        path: PathBuf,
    },
}

impl ProviderConfig {
    pub fn build(&self) -> Result<Arc<dyn FeedProvider>> {
        Ok(match self {
            ProviderConfig::Http {
                base_url,
                timeout_secs,
            } => Arc::new(HttpProvider::new(
                base_url,
                Duration::from_secs((*timeout_secs).max(1)),
            )?),
            ProviderConfig::Fixture { path } => Arc::new(FixtureProvider::from_path(path)),
        })
    }
}

/// Where cursors live. Without a path they are kept in memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StateConfig {
    pub fn build(&self) -> Arc<dyn StateStore> {
        match &self.path {
            Some(p) => JsonFileStore::shared(p) as Arc<dyn StateStore>,
            None => Arc::new(MemoryStore::new()),
        }
    }
}

impl TriggerConfig {
    /// Replace zero intervals/limits with defaults so a trigger can't spin.
    fn sanitize(mut self) -> Self {
        if self.poll.poll_interval_secs == 0 {
            self.poll.poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        }
        if self.poll.max_results == 0 {
            self.poll.max_results = DEFAULT_MAX_RESULTS;
        }
        if self.stream.polling_interval_ms == 0 {
            self.stream.polling_interval_ms = DEFAULT_STREAM_INTERVAL_MS;
        }
        if self.instance_id.trim().is_empty() {
            self.instance_id = default_instance_id();
        }
        self
    }
}

/// Load from an explicit path. Format follows the extension; unknown extensions
/// are sniffed.
pub fn load_from(path: &Path) -> Result<TriggerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading trigger config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, &ext).with_context(|| format!("parsing {}", path.display()))
}

/// Lookup order:
/// 1) `explicit` (usually `--config`)
/// 2) $FEED_TRIGGER_CONFIG
/// 3) config/trigger.toml
/// 4) config/trigger.json
pub fn load(explicit: Option<&Path>) -> Result<TriggerConfig> {
    if let Some(p) = explicit {
        return load_from(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in ["config/trigger.toml", "config/trigger.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_from(&pb);
        }
    }
    Err(anyhow!(
        "no trigger config found (pass --config, set {ENV_CONFIG_PATH}, or add config/trigger.toml)"
    ))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<TriggerConfig> {
    let cfg: TriggerConfig = match hint_ext {
        "toml" => toml::from_str(s)?,
        "json" => serde_json::from_str(s)?,
        _ if s.trim_start().starts_with('{') => serde_json::from_str(s)?,
        _ => toml::from_str(s)?,
    };
    Ok(cfg.sanitize())
}
