//! Device descriptors, track handles and the media session bundle

use crate::constraints::VideoResolution;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Kind of media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Video input
    Camera,
    /// Audio input
    Microphone,
    /// Audio output
    Speaker,
}

impl DeviceKind {
    /// Lower-case name for messages
    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceKind::Camera => "camera",
            DeviceKind::Microphone => "microphone",
            DeviceKind::Speaker => "speaker",
        }
    }

    /// Track kind produced by this device, if it is an input
    pub fn track_kind(&self) -> Option<TrackKind> {
        match self {
            DeviceKind::Camera => Some(TrackKind::Video),
            DeviceKind::Microphone => Some(TrackKind::Audio),
            DeviceKind::Speaker => None,
        }
    }
}

/// An enumerated device
///
/// Labels are empty until the user has granted access at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable device identifier
    pub id: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Human-readable label
    pub label: String,
    /// Physical device group (e.g. a webcam's camera and mic)
    pub group_id: Option<String>,
}

impl DeviceDescriptor {
    /// Create a descriptor
    pub fn new(id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            group_id: None,
        }
    }

    /// Label, or a generic name while labels are withheld
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            format!("{} {}", self.kind.display_name(), self.id)
        } else {
            self.label.clone()
        }
    }
}

/// Kind of media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// Device kind that produces this track
    pub fn device_kind(&self) -> DeviceKind {
        match self {
            TrackKind::Audio => DeviceKind::Microphone,
            TrackKind::Video => DeviceKind::Camera,
        }
    }
}

/// Settings the platform actually applied to a track
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackSettings {
    /// Video resolution
    pub resolution: Option<VideoResolution>,
    /// Video frame rate
    pub frame_rate: Option<f64>,
}

#[derive(Debug)]
struct TrackState {
    enabled: AtomicBool,
    ended: AtomicBool,
}

/// Handle to a live hardware track
///
/// Clones share state: stopping any handle ends the track for all of them.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    device_id: String,
    label: String,
    settings: TrackSettings,
    state: Arc<TrackState>,
}

impl MediaTrack {
    /// Create a new live track
    pub fn new(
        kind: TrackKind,
        device_id: impl Into<String>,
        label: impl Into<String>,
        settings: TrackSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            device_id: device_id.into(),
            label: label.into(),
            settings,
            state: Arc::new(TrackState {
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Get track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Device the track is sourced from
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Device label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Applied settings
    pub fn settings(&self) -> TrackSettings {
        self.settings
    }

    /// Whether the track produces media (false = muted/black)
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Mute or unmute without releasing the hardware
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Release);
    }

    /// Whether the track still holds its device
    pub fn is_live(&self) -> bool {
        !self.state.ended.load(Ordering::Acquire)
    }

    /// Release the device. Returns false if the track had already ended.
    pub fn stop(&self) -> bool {
        let stopped = !self.state.ended.swap(true, Ordering::AcqRel);
        if stopped {
            debug!("⏹️ Stopped {:?} track {} ({})", self.kind, self.id, self.device_id);
        }
        stopped
    }

    /// Whether both handles refer to the same underlying track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Zero or one camera track and zero or one microphone track
#[derive(Debug, Clone)]
pub struct MediaSession {
    id: Uuid,
    video: Option<MediaTrack>,
    audio: Option<MediaTrack>,
}

impl MediaSession {
    /// Bundle tracks into a session
    pub fn new(video: Option<MediaTrack>, audio: Option<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            video,
            audio,
        }
    }

    /// Synthesize one session from separately acquired parts
    ///
    /// The video track comes from `video`, the audio track from `audio`;
    /// any other track in the parts is stopped.
    pub fn merge(video: Option<MediaSession>, audio: Option<MediaSession>) -> Self {
        let (video_track, stray_audio) = match video {
            Some(session) => (session.video, session.audio),
            None => (None, None),
        };
        let (stray_video, audio_track) = match audio {
            Some(session) => (session.video, session.audio),
            None => (None, None),
        };
        for stray in stray_audio.iter().chain(stray_video.iter()) {
            stray.stop();
        }
        Self::new(video_track, audio_track)
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Camera track
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.video.as_ref()
    }

    /// Microphone track
    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.audio.as_ref()
    }

    /// Track of the given kind
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    /// Whether the session carries a camera track
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Whether the session carries a microphone track
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Whether the session carries no tracks at all
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    /// Iterate over the tracks
    pub fn tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.video.iter().chain(self.audio.iter())
    }

    /// Number of tracks still holding a device
    pub fn live_track_count(&self) -> usize {
        self.tracks().filter(|t| t.is_live()).count()
    }

    /// Whether any track still holds a device
    pub fn is_live(&self) -> bool {
        self.live_track_count() > 0
    }

    /// Apply camera/mic intent to the track enabled flags
    pub fn apply_toggles(&self, camera_enabled: bool, mic_enabled: bool) {
        if let Some(video) = &self.video {
            video.set_enabled(camera_enabled);
        }
        if let Some(audio) = &self.audio {
            audio.set_enabled(mic_enabled);
        }
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&self) -> usize {
        self.tracks().filter(|t| t.stop()).count()
    }
}
