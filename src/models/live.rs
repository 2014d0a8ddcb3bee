//! Live class records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Camera,
    Screen,
}

/// A published live teaching session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub class: String,
    pub section: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    pub stream_type: StreamType,
}

/// One student's presence entry under `viewers:{sessionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerPresence {
    pub student_id: String,
    pub student_name: String,
    pub last_seen: DateTime<Utc>,
}

/// Identity a viewer announces in its heartbeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceIdentity {
    pub student_id: String,
    pub student_name: String,
}
