//! Dashboard shell.
//!
//! Fetches every record collection for a viewer, scopes it, and re-runs that
//! pipeline whenever one of the collections changes or the poll interval
//! elapses. The pipeline is stateless; the latest view is published on a
//! watch channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::models::{
    keys, AudioMessage, FeeRecord, LiveSession, Notification, PaymentRequest, ReadStatus, Remark,
    Student, Timetable, Viewer,
};
use crate::records::load_visible;
use crate::store::{KvStore, RemoteStore};

/// Collections a dashboard listens to.
pub const WATCHED_KEYS: [&str; 8] = [
    keys::NOTIFICATIONS,
    keys::AUDIO_MESSAGES,
    keys::REMARKS,
    keys::LIVE_SESSIONS,
    keys::FEE_RECORDS,
    keys::PAYMENT_REQUESTS,
    keys::TIMETABLES,
    keys::STUDENTS,
];

/// Everything one viewer's dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub viewer: Viewer,
    pub notifications: Vec<Notification>,
    pub unread_notifications: usize,
    pub audio_messages: Vec<AudioMessage>,
    pub remarks: Vec<Remark>,
    pub live_sessions: Vec<LiveSession>,
    pub fee_records: Vec<FeeRecord>,
    pub payment_requests: Vec<PaymentRequest>,
    pub timetables: Vec<Timetable>,
    pub students: Vec<Student>,
}

pub struct DashboardShell<R> {
    store: Arc<KvStore<R>>,
    viewer: Viewer,
    poll_interval: Duration,
}

impl<R: RemoteStore> DashboardShell<R> {
    pub fn new(store: Arc<KvStore<R>>, viewer: Viewer, poll_interval: Duration) -> Self {
        Self {
            store,
            viewer,
            poll_interval,
        }
    }

    /// One fetch-and-filter pass.
    pub async fn refresh(&self) -> DashboardView {
        let store = self.store.as_ref();
        let viewer = &self.viewer;

        let notifications: Vec<Notification> =
            load_visible(store, keys::NOTIFICATIONS, viewer).await;
        let unread_notifications = notifications
            .iter()
            .filter(|n| n.status == ReadStatus::Unread)
            .count();

        DashboardView {
            viewer: viewer.clone(),
            notifications,
            unread_notifications,
            audio_messages: load_visible(store, keys::AUDIO_MESSAGES, viewer).await,
            remarks: load_visible(store, keys::REMARKS, viewer).await,
            live_sessions: load_visible(store, keys::LIVE_SESSIONS, viewer).await,
            fee_records: load_visible(store, keys::FEE_RECORDS, viewer).await,
            payment_requests: load_visible(store, keys::PAYMENT_REQUESTS, viewer).await,
            timetables: load_visible(store, keys::TIMETABLES, viewer).await,
            students: load_visible(store, keys::STUDENTS, viewer).await,
        }
    }

    /// Subscribe to every watched key, render once, then keep the view
    /// current until the handle is dropped.
    pub async fn mount(self) -> DashboardHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel::<()>();
        let subscriptions: Vec<_> = WATCHED_KEYS
            .iter()
            .map(|key| {
                let trigger = trigger_tx.clone();
                self.store.subscribe::<Value, _>(key, move |_| {
                    let _ = trigger.send(());
                })
            })
            .collect();
        drop(trigger_tx);

        let initial = self.refresh().await;
        let (tx, rx) = watch::channel(initial);

        tracing::debug!(role = ?self.viewer.role, "Dashboard mounted");

        let task = tokio::spawn(async move {
            let _subscriptions = subscriptions;
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    Some(()) = trigger_rx.recv() => {
                        // Collapse a burst of changes into one refresh.
                        while trigger_rx.try_recv().is_ok() {}
                    }
                }

                let view = self.refresh().await;
                tx.send_if_modified(|current| {
                    if *current == view {
                        return false;
                    }
                    *current = view;
                    true
                });
            }
        });

        DashboardHandle { task, view: rx }
    }
}

/// A mounted dashboard. Dropping it cancels the refresh loop and all of its
/// subscriptions.
pub struct DashboardHandle {
    task: JoinHandle<()>,
    view: watch::Receiver<DashboardView>,
}

impl DashboardHandle {
    pub fn current(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }
}

impl Drop for DashboardHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
