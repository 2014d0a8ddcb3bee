//! Key-value store adapter.
//!
//! Wraps the remote document store with a local fallback cache. Reads and
//! writes never fail from the caller's point of view: a remote failure is
//! logged and answered from the cache (reads) or reported as `false` (writes).

mod cache;

pub use cache::LocalCache;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{DocumentChange, WriteOutcome};

/// The remote document store the adapter talks to.
pub trait RemoteStore: Send + Sync + 'static {
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    fn store(
        &self,
        key: &str,
        value: &Value,
    ) -> impl Future<Output = Result<WriteOutcome, AppError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// A receiver for every change made after this call.
    fn changes(&self) -> broadcast::Receiver<DocumentChange>;
}

impl RemoteStore for Repository {
    async fn fetch(&self, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self.get_document(key).await?.map(|doc| doc.value))
    }

    async fn store(&self, key: &str, value: &Value) -> Result<WriteOutcome, AppError> {
        self.put_document(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<bool, AppError> {
        self.delete_document(key).await
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.subscribe()
    }
}

/// Typed get/set/subscribe over a [`RemoteStore`] with cache fallback.
pub struct KvStore<R> {
    remote: Arc<R>,
    cache: LocalCache,
}

impl<R: RemoteStore> KvStore<R> {
    pub fn new(remote: Arc<R>, cache: LocalCache) -> Self {
        Self { remote, cache }
    }

    /// Read `key`, falling back to the cache when the remote is unreachable
    /// and to `default` when nothing usable is found.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let value = match self.remote.fetch(key).await {
            Ok(Some(value)) => {
                self.cache.put(key, value.to_string()).await;
                value
            }
            Ok(None) => {
                self.cache.remove(key).await;
                return default;
            }
            Err(e) => {
                tracing::warn!(key, "Remote read failed, using local cache: {}", e);
                let Some(raw) = self.cache.get(key).await else {
                    return default;
                };
                match serde_json::from_str(&raw) {
                    Ok(value) => value,
                    Err(_) => return default,
                }
            }
        };

        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(key, "Document does not match the expected shape: {}", e);
            default
        })
    }

    /// Persist `value` locally and remotely. The result reports only whether
    /// the remote write went through; the local copy is always updated.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "Refusing to store unserializable value: {}", e);
                return false;
            }
        };

        self.cache.put(key, value.to_string()).await;

        match self.remote.store(key, &value).await {
            Ok(outcome) => {
                tracing::debug!(key, revision = outcome.revision_id, changed = outcome.changed, "Stored");
                true
            }
            Err(e) => {
                tracing::warn!(key, "Remote write failed, kept local copy only: {}", e);
                false
            }
        }
    }

    /// Remove `key` locally and remotely. Returns whether the remote call succeeded.
    pub async fn remove(&self, key: &str) -> bool {
        self.cache.remove(key).await;

        match self.remote.remove(key).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(key, "Remote delete failed: {}", e);
                false
            }
        }
    }

    /// Invoke `on_change` with the new value every time `key` changes
    /// remotely, or with `None` when it is removed.
    ///
    /// The listener runs until the returned [`Subscription`] is dropped or
    /// cancelled. Each subscriber has its own feed.
    pub fn subscribe<T, F>(&self, key: &str, on_change: F) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let mut feed = self.remote.changes();
        let remote = Arc::clone(&self.remote);
        let cache = self.cache.clone();
        let key = key.to_string();

        let task = tokio::spawn(async move {
            loop {
                let value = match feed.recv().await {
                    Ok(change) if change.key == key => change.value,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(key = %key, skipped, "Subscriber lagged, refetching");
                        match remote.fetch(&key).await {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::warn!(key = %key, "Refetch after lag failed: {}", e);
                                continue;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                };

                match &value {
                    Some(value) => cache.put(&key, value.to_string()).await,
                    None => cache.remove(&key).await,
                }

                match value.map(serde_json::from_value::<T>).transpose() {
                    Ok(decoded) => on_change(decoded),
                    Err(e) => {
                        tracing::warn!(key = %key, "Ignoring change with unexpected shape: {}", e)
                    }
                }
            }
        });

        Subscription { task }
    }
}

/// Handle to a running key subscription. Dropping it cancels the listener.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
