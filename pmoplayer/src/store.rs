//! Key/value store implementations.
//!
//! [`MemoryStore`] keeps entries for the lifetime of the process.
//! [`JsonFileStore`] persists them to one JSON document so positions and
//! cached guides survive a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::collaborators::KeyValueStore;
use crate::error::{Error, Result};

struct MemoryEntry {
    value: String,
    expires: Option<Instant>,
}

/// In-process store. Expiry follows the tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail until reset.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::storage("store unavailable"));
        }
        Ok(())
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("store mutex poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut entries = self.entries()?;
        let expired = entries
            .get(key)
            .and_then(|e| e.expires)
            .map(|at| at <= Instant::now())
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries()?
            .insert(key.to_string(), MemoryEntry { value, expires });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries()?.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires: Option<DateTime<Utc>>,
}

/// Store persisted as a single JSON file, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<Option<HashMap<String, FileEntry>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: tokio::sync::Mutex::new(None),
        }
    }

    /// Store file inside the configuration directory.
    pub fn from_config(config: &pmoconfig::Config) -> Self {
        Self::new(Path::new(config.directory()).join("player_cache.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, FileEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Corrupt cache file, starting empty");
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(Error::storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn persist(&self, entries: &HashMap<String, FileEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(entries)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "Cache file written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard.get_or_insert_with(HashMap::new);
        let now = Utc::now();
        let expired = entries
            .get(key)
            .and_then(|e| e.expires)
            .map(|at| at <= now)
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard.get_or_insert_with(HashMap::new);
        let expires = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        entries.insert(key.to_string(), FileEntry { value, expires });
        self.persist(entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard.get_or_insert_with(HashMap::new);
        if entries.remove(key).is_some() {
            self.persist(entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store
            .set("a", "1".into(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.set("b", "2".into(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_memory_store_failure_mode() {
        let store = MemoryStore::new();
        store.fail(true);
        assert!(store.set("a", "1".into(), None).await.is_err());
        store.fail(false);
        store.set("a", "1".into(), None).await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("player.json");

        let store = JsonFileStore::new(&path);
        store.set("position:x", "{}".into(), None).await.unwrap();
        store
            .set("gone", "1".into(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        store.remove("gone").await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("position:x").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(reopened.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(JsonFileStore::new(&path).get("k").await.unwrap().as_deref(), Some("v"));
    }
}
