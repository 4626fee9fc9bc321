//! Stream request constraints

use crate::error::MediaError;
use crate::tracks::DeviceKind;
use serde::{Deserialize, Serialize};

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD: Self = Self::new(1280, 720);
    pub const VGA: Self = Self::new(640, 480);

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Ideal resolution and frame rate for the camera preview
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub resolution: VideoResolution,
    pub frame_rate: f64,
}

impl VideoProfile {
    /// Low-cost preview profile used in the lobby
    pub const LOBBY: Self = Self {
        resolution: VideoResolution::VGA,
        frame_rate: 24.0,
    };

    pub fn validate(&self) -> Result<(), MediaError> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Invalid resolution".to_string(),
            });
        }

        if self.frame_rate <= 0.0 || self.frame_rate > 120.0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Invalid framerate".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self::LOBBY
    }
}

/// How a request picks its device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelector {
    /// Platform default
    Default,
    /// Use this device if possible, otherwise any
    Preferred(String),
    /// This device or fail
    Exact(String),
}

impl DeviceSelector {
    /// Prefer `id` when given, otherwise the default device
    pub fn preferred(id: Option<&str>) -> Self {
        match id {
            Some(id) => DeviceSelector::Preferred(id.to_string()),
            None => DeviceSelector::Default,
        }
    }

    /// Pin `id` when given, otherwise the default device
    pub fn exact(id: Option<&str>) -> Self {
        match id {
            Some(id) => DeviceSelector::Exact(id.to_string()),
            None => DeviceSelector::Default,
        }
    }

    /// Device id named by the selector
    pub fn device_id(&self) -> Option<&str> {
        match self {
            DeviceSelector::Default => None,
            DeviceSelector::Preferred(id) | DeviceSelector::Exact(id) => Some(id),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, DeviceSelector::Exact(_))
    }
}

/// Microphone request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub device: DeviceSelector,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl AudioConstraints {
    pub fn with_device(device: DeviceSelector) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            device: DeviceSelector::Default,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Camera request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub device: DeviceSelector,
    pub profile: VideoProfile,
}

impl VideoConstraints {
    pub fn new(device: DeviceSelector, profile: VideoProfile) -> Self {
        Self { device, profile }
    }
}

/// A single stream request; absent kinds are not requested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub audio: Option<AudioConstraints>,
    pub video: Option<VideoConstraints>,
}

impl StreamConstraints {
    /// Camera and microphone together
    pub fn combined(video: VideoConstraints, audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: Some(video),
        }
    }

    /// Camera only
    pub fn video_only(video: VideoConstraints) -> Self {
        Self {
            audio: None,
            video: Some(video),
        }
    }

    /// Microphone only
    pub fn audio_only(audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: None,
        }
    }

    /// Device kinds this request asks for
    pub fn requested_kinds(&self) -> Vec<DeviceKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.video.is_some() {
            kinds.push(DeviceKind::Camera);
        }
        if self.audio.is_some() {
            kinds.push(DeviceKind::Microphone);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    /// Reject requests the platform would refuse outright
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.is_empty() {
            return Err(MediaError::Unsupported {
                reason: "at least one of audio or video must be requested".to_string(),
            });
        }
        if let Some(video) = &self.video {
            video.profile.validate()?;
        }
        Ok(())
    }
}
