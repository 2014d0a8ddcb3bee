//! Local durable fallback cache.
//!
//! A flat key to JSON-text map, mirrored to a single file when a path is
//! configured. Writes always succeed in memory; a failed flush is logged.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct LocalCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    path: Option<Arc<PathBuf>>,
}

impl LocalCache {
    /// In-memory cache with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the cache at `path`, loading whatever a previous run left there.
    pub async fn open(path: PathBuf) -> Self {
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable cache file {:?}: {}", path, e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read cache file {:?}: {}", path, e);
                HashMap::new()
            }
        };

        tracing::debug!("Local cache loaded with {} entries", entries.len());

        Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(Arc::new(path)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: &str, value: String) {
        let mut entries = self.entries.write().await;
        if entries.get(key) == Some(&value) {
            return;
        }
        entries.insert(key.to_string(), value);
        self.flush(&entries).await;
    }

    pub async fn remove(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await;
        }
    }

    // Called with the write guard held so flushes never interleave.
    async fn flush(&self, entries: &HashMap<String, String>) {
        let Some(path) = &self.path else {
            return;
        };

        let raw = match serde_json::to_string(entries) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize local cache: {}", e);
                return;
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        if let Err(e) = tokio::fs::write(&**path, raw).await {
            tracing::warn!("Failed to write cache file {:?}: {}", path, e);
        }
    }
}
