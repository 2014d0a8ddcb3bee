//! Teacher-side live session state machine: Idle, Setup, Live.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::media::{MediaCapture, MediaError, MediaKind, MediaStream};
use crate::models::{keys, LiveSession, StreamType};
use crate::presence::{PresenceTracker, ViewerCountWatch};
use crate::records::{field_is, remove_matching, replace_matching, upsert};
use crate::store::{KvStore, RemoteStore};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("A title is required before going live")]
    MissingTitle,
    #[error("Open the teach online panel before you {0}")]
    NotInSetup(&'static str),
    #[error("There is no live session to {0}")]
    NotLive(&'static str),
    #[error("A live session is already running")]
    AlreadyLive,
    #[error("The current stream has no {0} track")]
    NoTrack(MediaKind),
    #[error(transparent)]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Setup,
    Live,
}

/// Details entered in the teach online panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherIdentity {
    pub id: String,
    pub name: String,
}

enum State {
    Idle,
    Setup(SessionDraft),
    Live {
        session: LiveSession,
        stream: MediaStream,
        viewers: ViewerCountWatch,
    },
}

/// Snapshot of a console for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleStatus {
    pub teacher: TeacherIdentity,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<SessionDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<LiveSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<MediaStream>,
    pub active_viewers: usize,
}

pub struct TeachingConsole<R> {
    store: Arc<KvStore<R>>,
    presence: PresenceTracker<R>,
    teacher: TeacherIdentity,
    viewer_poll_interval: Duration,
    state: State,
}

impl<R: RemoteStore> TeachingConsole<R> {
    pub fn new(
        store: Arc<KvStore<R>>,
        presence: PresenceTracker<R>,
        teacher: TeacherIdentity,
        viewer_poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            presence,
            teacher,
            viewer_poll_interval,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Setup(_) => Phase::Setup,
            State::Live { .. } => Phase::Live,
        }
    }

    pub fn session(&self) -> Option<&LiveSession> {
        match &self.state {
            State::Live { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn status(&self) -> ConsoleStatus {
        let mut status = ConsoleStatus {
            teacher: self.teacher.clone(),
            phase: self.phase(),
            draft: None,
            session: None,
            stream: None,
            active_viewers: 0,
        };
        match &self.state {
            State::Idle => {}
            State::Setup(draft) => status.draft = Some(draft.clone()),
            State::Live {
                session,
                stream,
                viewers,
            } => {
                status.session = Some(session.clone());
                status.stream = Some(stream.clone());
                status.active_viewers = viewers.current();
            }
        }
        status
    }

    /// Idle to Setup. Re-opening an open panel keeps the draft.
    pub fn open_setup(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            State::Idle => {
                self.state = State::Setup(SessionDraft::default());
                Ok(())
            }
            State::Setup(_) => Ok(()),
            State::Live { .. } => Err(LifecycleError::AlreadyLive),
        }
    }

    pub fn update_draft(&mut self, draft: SessionDraft) -> Result<(), LifecycleError> {
        match &mut self.state {
            State::Setup(current) => {
                *current = draft;
                Ok(())
            }
            State::Idle => Err(LifecycleError::NotInSetup("edit the session")),
            State::Live { .. } => Err(LifecycleError::AlreadyLive),
        }
    }

    /// Setup back to Idle without going live.
    pub fn cancel_setup(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            State::Setup(_) => {
                self.state = State::Idle;
                Ok(())
            }
            State::Idle => Err(LifecycleError::NotInSetup("cancel")),
            State::Live { .. } => Err(LifecycleError::AlreadyLive),
        }
    }

    /// Setup to Live: acquire media, replace this teacher's previous session
    /// record and publish a fresh one. A media failure leaves the console in Setup.
    pub async fn start_streaming<M: MediaCapture>(
        &mut self,
        capture: &M,
        source: StreamType,
    ) -> Result<LiveSession, LifecycleError> {
        let draft = match &self.state {
            State::Setup(draft) => draft.clone(),
            State::Idle => return Err(LifecycleError::NotInSetup("go live")),
            State::Live { .. } => return Err(LifecycleError::AlreadyLive),
        };
        if draft.title.trim().is_empty() {
            return Err(LifecycleError::MissingTitle);
        }

        let stream = capture.acquire(source).await.inspect_err(|e| {
            tracing::info!(teacher_id = %self.teacher.id, "Media acquisition failed: {}", e);
        })?;

        let started_at = self.presence.now();
        let session = LiveSession {
            id: format!("{}-{}", self.teacher.id, started_at.timestamp_millis()),
            teacher_id: self.teacher.id.clone(),
            teacher_name: self.teacher.name.clone(),
            class: draft.class,
            section: draft.section,
            title: draft.title.trim().to_string(),
            description: draft.description,
            is_live: true,
            started_at,
            stream_type: source,
        };

        let teacher_id = self.teacher.id.as_str();
        let replaced: Vec<String> = replace_matching(
            &self.store,
            keys::LIVE_SESSIONS,
            |entry| field_is(entry, "teacherId", teacher_id),
            &session,
        )
        .await
        .iter()
        .filter_map(|entry| entry.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
        for stale in &replaced {
            self.presence.clear(stale).await;
        }

        tracing::info!(
            session_id = %session.id,
            teacher_id = %self.teacher.id,
            class = %session.class,
            section = %session.section,
            replaced = replaced.len(),
            "Live session started"
        );

        let viewers = self
            .presence
            .watch_active(&session.id, self.viewer_poll_interval);
        self.state = State::Live {
            session: session.clone(),
            stream,
            viewers,
        };
        Ok(session)
    }

    pub fn toggle_camera(&mut self) -> Result<bool, LifecycleError> {
        let stream = self.live_stream("toggle the camera")?;
        if stream.source != StreamType::Camera {
            return Err(LifecycleError::NoTrack(MediaKind::Camera));
        }
        stream.video.enabled = !stream.video.enabled;
        Ok(stream.video.enabled)
    }

    pub fn toggle_microphone(&mut self) -> Result<bool, LifecycleError> {
        let stream = self.live_stream("toggle the microphone")?;
        let audio = stream
            .audio
            .as_mut()
            .ok_or(LifecycleError::NoTrack(MediaKind::Microphone))?;
        audio.enabled = !audio.enabled;
        Ok(audio.enabled)
    }

    /// Switch between camera and screen share while staying live.
    ///
    /// The new stream is acquired before the old one is released, so a
    /// refused screen share keeps the camera running.
    pub async fn switch_stream<M: MediaCapture>(
        &mut self,
        capture: &M,
        source: StreamType,
    ) -> Result<(), LifecycleError> {
        if self.live_stream("switch streams")?.source == source {
            return Ok(());
        }

        let fresh = capture.acquire(source).await?;

        let State::Live {
            session, stream, ..
        } = &mut self.state
        else {
            return Err(LifecycleError::NotLive("switch streams"));
        };
        let mut old = std::mem::replace(stream, fresh);
        old.release();
        session.stream_type = source;
        let session = session.clone();

        upsert(
            &self.store,
            keys::LIVE_SESSIONS,
            |entry| field_is(entry, "id", &session.id),
            &session,
        )
        .await;

        tracing::info!(session_id = %session.id, ?source, "Live stream switched");
        Ok(())
    }

    /// Live to Idle: release media, drop the session record and its presence
    /// list. Returns the released stream.
    pub async fn stop_streaming(&mut self) -> Result<MediaStream, LifecycleError> {
        if !matches!(self.state, State::Live { .. }) {
            return Err(LifecycleError::NotLive("stop"));
        }
        let State::Live {
            session,
            mut stream,
            viewers,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return Err(LifecycleError::NotLive("stop"));
        };

        stream.release();
        drop(viewers);

        remove_matching(&self.store, keys::LIVE_SESSIONS, |entry| {
            field_is(entry, "id", &session.id)
        })
        .await;
        self.presence.clear(&session.id).await;

        tracing::info!(session_id = %session.id, "Live session stopped");
        Ok(stream)
    }

    fn live_stream(&mut self, action: &'static str) -> Result<&mut MediaStream, LifecycleError> {
        match &mut self.state {
            State::Live { stream, .. } => Ok(stream),
            _ => Err(LifecycleError::NotLive(action)),
        }
    }
}
