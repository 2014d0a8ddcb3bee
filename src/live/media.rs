//! Local media capture handles.
//!
//! The device work itself happens in the browser; this side models the
//! resulting handles so the console can enforce acquire/toggle/release.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StreamType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Camera,
    Microphone,
    Screen,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Camera => "camera",
            MediaKind::Microphone => "microphone",
            MediaKind::Screen => "screen",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Permission to use the {0} was denied")]
    PermissionDenied(MediaKind),
    #[error("No {0} device is available")]
    NoDevice(MediaKind),
}

/// Acquires capture streams, like `getUserMedia`/`getDisplayMedia`.
pub trait MediaCapture: Send + Sync {
    fn acquire(
        &self,
        source: StreamType,
    ) -> impl Future<Output = Result<MediaStream, MediaError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub kind: MediaKind,
    pub enabled: bool,
    pub live: bool,
}

impl Track {
    fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            enabled: true,
            live: true,
        }
    }
}

/// A revocable capture stream: one video track and an optional audio track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStream {
    pub source: StreamType,
    pub video: Track,
    pub audio: Option<Track>,
}

impl MediaStream {
    pub fn new(source: StreamType, with_audio: bool) -> Self {
        let video = match source {
            StreamType::Camera => Track::new(MediaKind::Camera),
            StreamType::Screen => Track::new(MediaKind::Screen),
        };
        Self {
            source,
            video,
            audio: with_audio.then(|| Track::new(MediaKind::Microphone)),
        }
    }

    /// Stop every track. Released handles cannot be re-enabled.
    pub fn release(&mut self) {
        for track in self.tracks_mut() {
            track.live = false;
            track.enabled = false;
        }
    }

    pub fn is_released(&self) -> bool {
        !self.video.live && self.audio.as_ref().map_or(true, |a| !a.live)
    }

    fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        std::iter::once(&mut self.video).chain(self.audio.as_mut())
    }
}

/// Devices the browser reported as granted for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGrants {
    #[serde(default)]
    pub camera: bool,
    #[serde(default)]
    pub microphone: bool,
    #[serde(default)]
    pub screen: bool,
    /// Devices the browser could not find at all
    #[serde(default)]
    pub missing: Vec<MediaKind>,
}

impl DeviceGrants {
    pub fn all() -> Self {
        Self {
            camera: true,
            microphone: true,
            screen: true,
            missing: Vec::new(),
        }
    }
}

impl MediaCapture for DeviceGrants {
    async fn acquire(&self, source: StreamType) -> Result<MediaStream, MediaError> {
        let (kind, granted) = match source {
            StreamType::Camera => (MediaKind::Camera, self.camera),
            StreamType::Screen => (MediaKind::Screen, self.screen),
        };
        if self.missing.contains(&kind) {
            return Err(MediaError::NoDevice(kind));
        }
        if !granted {
            return Err(MediaError::PermissionDenied(kind));
        }
        let with_audio = self.microphone && !self.missing.contains(&MediaKind::Microphone);
        Ok(MediaStream::new(source, with_audio))
    }
}
