//! Heartbeat-based presence for live sessions.
//!
//! Viewers upsert `{studentId, studentName, lastSeen}` into
//! `viewers:{sessionId}` on a fixed interval. Entries are never removed by
//! the viewer; readers treat anything older than the TTL as gone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncSettings;
use crate::models::{keys, PresenceIdentity, ViewerPresence};
use crate::records::{field_is, load, upsert};
use crate::store::{KvStore, RemoteStore};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct PresenceTracker<R> {
    store: Arc<KvStore<R>>,
    clock: Arc<dyn Clock>,
    heartbeat_interval: Duration,
    ttl: Duration,
}

impl<R> Clone for PresenceTracker<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            heartbeat_interval: self.heartbeat_interval,
            ttl: self.ttl,
        }
    }
}

impl<R: RemoteStore> PresenceTracker<R> {
    pub fn new(store: Arc<KvStore<R>>, clock: Arc<dyn Clock>, settings: &SyncSettings) -> Self {
        Self {
            store,
            clock,
            heartbeat_interval: settings.heartbeat_interval,
            ttl: settings.presence_ttl,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Upsert one presence entry for `identity` stamped with the current time.
    ///
    /// Other entries are written back as stored, even ones that no longer decode.
    pub async fn beat(&self, session_id: &str, identity: &PresenceIdentity) -> bool {
        let entry = ViewerPresence {
            student_id: identity.student_id.clone(),
            student_name: identity.student_name.clone(),
            last_seen: self.clock.now(),
        };
        upsert(
            &self.store,
            &keys::viewers(session_id),
            |raw| field_is(raw, "studentId", &identity.student_id),
            &entry,
        )
        .await
    }

    /// Beat now, then again every heartbeat interval until the handle is stopped.
    pub fn start_heartbeat(&self, session_id: &str, identity: PresenceIdentity) -> HeartbeatHandle {
        let tracker = self.clone();
        let session_id = session_id.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tracker.beat(&session_id, &identity).await {
                    tracing::debug!(session_id = %session_id, "Heartbeat kept locally only");
                }
            }
        });

        HeartbeatHandle { task }
    }

    /// Entries whose last heartbeat is younger than the TTL.
    pub async fn active_viewers(&self, session_id: &str) -> Vec<ViewerPresence> {
        let entries: Vec<ViewerPresence> = load(&self.store, &keys::viewers(session_id)).await;
        let now = self.clock.now();
        entries
            .into_iter()
            .filter(|entry| is_fresh(now, entry.last_seen, self.ttl))
            .collect()
    }

    pub async fn count_active(&self, session_id: &str) -> usize {
        self.active_viewers(session_id).await.len()
    }

    /// Drop the whole presence list for a session.
    pub async fn clear(&self, session_id: &str) -> bool {
        self.store.remove(&keys::viewers(session_id)).await
    }

    /// Poll the active viewer count on `every` and publish it on a watch channel.
    pub fn watch_active(&self, session_id: &str, every: Duration) -> ViewerCountWatch {
        let tracker = self.clone();
        let session_id = session_id.to_string();
        let (tx, rx) = watch::channel(0);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let count = tracker.count_active(&session_id).await;
                if tx.send(count).is_err() {
                    break;
                }
            }
        });

        ViewerCountWatch { task, count: rx }
    }
}

fn is_fresh(now: DateTime<Utc>, last_seen: DateTime<Utc>, ttl: Duration) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(last_seen) < ttl,
        Err(_) => true,
    }
}

/// Running heartbeat. Stopping leaves the last entry to age out.
#[must_use = "dropping a HeartbeatHandle stops the heartbeat"]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Live viewer count for the producing side.
pub struct ViewerCountWatch {
    task: JoinHandle<()>,
    count: watch::Receiver<usize>,
}

impl ViewerCountWatch {
    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    pub fn receiver(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

impl Drop for ViewerCountWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use crate::store::testing::store;
    use tokio::time::{sleep, timeout};

    fn identity(id: &str) -> PresenceIdentity {
        PresenceIdentity {
            student_id: id.to_string(),
            student_name: format!("Student {}", id),
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            heartbeat_interval: Duration::from_millis(50),
            ..SyncSettings::default()
        }
    }

    #[tokio::test]
    async fn test_no_heartbeats_counts_zero() {
        let (store, _) = store().await;
        let tracker = PresenceTracker::new(store, ManualClock::new(), &settings());
        assert_eq!(tracker.count_active("nobody").await, 0);
    }

    #[tokio::test]
    async fn test_beat_upserts_by_student() {
        let (store, _) = store().await;
        let clock = ManualClock::new();
        let tracker = PresenceTracker::new(Arc::clone(&store), clock.clone(), &settings());

        tracker.beat("s1", &identity("a")).await;
        clock.advance(Duration::from_secs(3));
        tracker.beat("s1", &identity("a")).await;
        tracker.beat("s1", &identity("b")).await;

        let entries: Vec<ViewerPresence> = store.get(&keys::viewers("s1"), Vec::new()).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].student_id, "a");
        assert_eq!(entries[0].last_seen, clock.now());
        assert_eq!(tracker.count_active("s1").await, 2);
    }

    #[tokio::test]
    async fn test_beat_keeps_undecodable_entries() {
        let (store, _) = store().await;
        let clock = ManualClock::new();
        let tracker = PresenceTracker::new(Arc::clone(&store), clock.clone(), &settings());
        let key = keys::viewers("s1");

        tracker.beat("s1", &identity("a")).await;
        let mut raw: Vec<serde_json::Value> = store.get(&key, Vec::new()).await;
        // A timestamp in epoch millis rather than RFC 3339.
        raw.push(serde_json::json!({
            "studentId": "b",
            "studentName": "Student b",
            "lastSeen": 1767225600000u64
        }));
        store.set(&key, &raw).await;

        tracker.beat("s1", &identity("c")).await;

        let raw: Vec<serde_json::Value> = store.get(&key, Vec::new()).await;
        let ids: Vec<&str> = raw.iter().filter_map(|e| e["studentId"].as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        // The unreadable entry is skipped when counting, not fatal.
        assert_eq!(tracker.count_active("s1").await, 2);
    }

    #[tokio::test]
    async fn test_entries_age_out_after_ttl() {
        let (store, _) = store().await;
        let clock = ManualClock::new();
        let tracker = PresenceTracker::new(store, clock.clone(), &settings());

        tracker.beat("s1", &identity("a")).await;
        clock.advance(Duration::from_secs(6));
        tracker.beat("s1", &identity("b")).await;

        clock.advance(Duration::from_secs(4));
        // a is exactly 10s old and no longer counts; b is 4s old.
        assert_eq!(tracker.count_active("s1").await, 1);

        clock.advance(Duration::from_secs(6));
        assert_eq!(tracker.count_active("s1").await, 0);
    }

    #[tokio::test]
    async fn test_clear_resets_count() {
        let (store, _) = store().await;
        let tracker = PresenceTracker::new(store, ManualClock::new(), &settings());

        tracker.beat("s1", &identity("a")).await;
        assert!(tracker.clear("s1").await);
        assert_eq!(tracker.count_active("s1").await, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_beats_immediately_and_stops() {
        let (store, _) = store().await;
        let tracker = PresenceTracker::new(store, Arc::new(SystemClock), &settings());

        let handle = tracker.start_heartbeat("s1", identity("a"));
        timeout(Duration::from_secs(2), async {
            while tracker.count_active("s1").await == 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        handle.stop();
        sleep(Duration::from_millis(20)).await;
        let first = tracker.active_viewers("s1").await[0].last_seen;
        sleep(Duration::from_millis(150)).await;
        let later = tracker.active_viewers("s1").await;

        // Stopping leaves the entry in place with no further refreshes.
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].last_seen, first);
    }

    #[tokio::test]
    async fn test_watch_active_publishes_count() {
        let (store, _) = store().await;
        let tracker = PresenceTracker::new(store, Arc::new(SystemClock), &settings());
        let watch = tracker.watch_active("s1", Duration::from_millis(20));
        let mut rx = watch.receiver();

        tracker.beat("s1", &identity("a")).await;
        tracker.beat("s1", &identity("b")).await;

        timeout(Duration::from_secs(2), rx.wait_for(|count| *count == 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(watch.current(), 2);
    }
}
