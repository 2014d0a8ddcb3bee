//! Principal- and teacher-authored messages addressed to an audience.

use serde::{Deserialize, Serialize};

use super::Audience;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    #[default]
    Unread,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(flatten)]
    pub audience: Audience,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: ReadStatus,
    pub created_at: String,
}

/// A recorded voice note; the audio payload itself is an opaque data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(flatten)]
    pub audience: Audience,
    #[serde(default)]
    pub title: String,
    pub audio_data: String,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub status: ReadStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remark {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    #[serde(flatten)]
    pub audience: Audience,
    pub remark: String,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: String,
}

/// Records whose recipient may flip a read flag.
pub trait Readable {
    fn mark_read(&mut self);
}

impl Readable for Notification {
    fn mark_read(&mut self) {
        self.status = ReadStatus::Read;
    }
}

impl Readable for AudioMessage {
    fn mark_read(&mut self) {
        self.status = ReadStatus::Read;
    }
}
