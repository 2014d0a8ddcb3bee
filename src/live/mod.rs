//! Live class lifecycle.
//!
//! Each teacher gets one [`TeachingConsole`]; the registry hands out shared
//! handles so concurrent requests for the same teacher are serialized.

mod console;
mod media;

pub use console::*;
pub use media::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::presence::PresenceTracker;
use crate::store::{KvStore, RemoteStore};

pub type SharedConsole<R> = Arc<Mutex<TeachingConsole<R>>>;

pub struct LiveConsoles<R> {
    store: Arc<KvStore<R>>,
    presence: PresenceTracker<R>,
    viewer_poll_interval: Duration,
    consoles: Mutex<HashMap<String, SharedConsole<R>>>,
}

impl<R: RemoteStore> LiveConsoles<R> {
    pub fn new(
        store: Arc<KvStore<R>>,
        presence: PresenceTracker<R>,
        viewer_poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            presence,
            viewer_poll_interval,
            consoles: Mutex::new(HashMap::new()),
        }
    }

    /// The console for `teacher`, created Idle on first use.
    pub async fn console(&self, teacher: &TeacherIdentity) -> SharedConsole<R> {
        let mut consoles = self.consoles.lock().await;
        let console = consoles.entry(teacher.id.clone()).or_insert_with(|| {
            tracing::debug!(teacher_id = %teacher.id, "Creating teaching console");
            Arc::new(Mutex::new(TeachingConsole::new(
                Arc::clone(&self.store),
                self.presence.clone(),
                teacher.clone(),
                self.viewer_poll_interval,
            )))
        });
        Arc::clone(console)
    }

    /// An existing console, if this teacher ever opened one.
    pub async fn find(&self, teacher_id: &str) -> Option<SharedConsole<R>> {
        self.consoles.lock().await.get(teacher_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::presence::SystemClock;
    use crate::store::testing::store;

    #[tokio::test]
    async fn test_registry_reuses_console_per_teacher() {
        let (store, _remote) = store().await;
        let presence = PresenceTracker::new(
            Arc::clone(&store),
            Arc::new(SystemClock),
            &SyncSettings::default(),
        );
        let consoles = LiveConsoles::new(store, presence, Duration::from_secs(3));
        let teacher = TeacherIdentity {
            id: "t1".to_string(),
            name: "Mr. Rao".to_string(),
        };

        assert!(consoles.find("t1").await.is_none());

        let first = consoles.console(&teacher).await;
        first.lock().await.open_setup().unwrap();

        let again = consoles.find("t1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.lock().await.phase(), Phase::Setup);
    }
}
