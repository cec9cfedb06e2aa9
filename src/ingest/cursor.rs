// src/ingest/cursor.rs
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use tokio::fs;

/// Key/value state shared by the triggers of one process.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.inner.lock().expect("state mutex poisoned");
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut map = self.inner.lock().expect("state mutex poisoned");
        map.insert(key.to_string(), value);
        Ok(())
    }
}

/// Whole map serialized as pretty JSON, rewritten on every `set`.
///
/// Writes go to a sibling temp file that is renamed over the target, so a crash
/// never leaves a torn file. A file that is unreadable anyway is logged and read
/// as empty: every cursor in it becomes "unknown" again.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    write_lock: tokio::sync::Mutex<()>,
}

/// Live stores by path, so every activation in the process that names the same
/// file shares one write lock.
static SHARED: Lazy<Mutex<HashMap<PathBuf, Weak<JsonFileStore>>>> = Lazy::new(Default::default);

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The process-wide store for `path`, created on first use.
    pub fn shared(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let key = std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or_else(|_| path.clone());

        let mut stores = SHARED.lock().expect("store registry poisoned");
        if let Some(store) = stores.get(&key).and_then(Weak::upgrade) {
            return store;
        }
        stores.retain(|_, w| w.strong_count() > 0);
        let store = Arc::new(Self::new(path));
        stores.insert(key, Arc::downgrade(&store));
        store
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        let s = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading state file {}", self.path.display()))
            }
        };
        if s.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&s) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(
                    target: "trigger",
                    path = %self.path.display(),
                    error = %e,
                    "state file unreadable; cursors reset"
                );
                Ok(BTreeMap::new())
            }
        }
    }
}

#[async_trait::async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(&map).context("serializing state")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing state file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing state file {}", self.path.display()))
    }
}

/// Last processed item id of one workflow instance.
///
/// An absent value means "unknown", not "nothing seen": the next poll treats its
/// whole page as new.
#[derive(Clone)]
pub struct Cursor {
    store: Arc<dyn StateStore>,
    key: String,
}

impl Cursor {
    pub fn scoped(store: Arc<dyn StateStore>, instance_id: &str) -> Self {
        Self {
            store,
            key: format!("{instance_id}/lastProcessedId"),
        }
    }

    pub async fn load(&self) -> Result<Option<String>> {
        self.store.get(&self.key).await
    }

    pub async fn advance(&self, id: &str) -> Result<()> {
        self.store.set(&self.key, id.to_string()).await
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cursors_of_different_instances_do_not_share_state() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let a = Cursor::scoped(store.clone(), "wf-a");
        let b = Cursor::scoped(store, "wf-b");

        assert_eq!(a.load().await.unwrap(), None);
        a.advance("42").await.unwrap();
        assert_eq!(a.load().await.unwrap().as_deref(), Some("42"));
        assert_eq!(b.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("cursor.json");

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "7".into()).await.unwrap();
        store.set("other", "x".into()).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("7"));
        assert_eq!(reopened.get("other").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn torn_state_file_reads_as_unknown_and_is_repaired() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cursor.json");
        std::fs::write(&path, r#"{"wf/lastProcessedId": "4"#).unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("wf/lastProcessedId").await.unwrap(), None);

        store.set("wf/lastProcessedId", "5".into()).await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&body).unwrap();
        assert_eq!(map["wf/lastProcessedId"], "5");
        assert!(!tmp.path().join("cursor.json.tmp").exists());
    }

    #[tokio::test]
    async fn shared_store_serializes_writers_on_one_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shared.json");

        let a = JsonFileStore::shared(&path);
        let b = JsonFileStore::shared(&path);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &JsonFileStore::shared(tmp.path().join("other.json"))));

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store: Arc<dyn StateStore> = JsonFileStore::shared(&path);
                tokio::spawn(async move {
                    Cursor::scoped(store, &format!("wf-{i}"))
                        .advance(&i.to_string())
                        .await
                })
            })
            .collect();
        for w in writers {
            w.await.unwrap().unwrap();
        }

        for i in 0..16 {
            let got = a.get(&format!("wf-{i}/lastProcessedId")).await.unwrap();
            assert_eq!(got, Some(i.to_string()), "cursor of wf-{i} lost");
        }
    }
}
