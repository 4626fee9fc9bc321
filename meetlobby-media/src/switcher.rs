//! Acquire-then-swap device switching
//!
//! A switch never stops the current session before a replacement exists.
//! The new stream is requested with the changed device pinned; the old
//! session is stopped only once that request has succeeded, so a failed
//! switch leaves the preview untouched.

use crate::acquirer::MediaStreamAcquirer;
use crate::constraints::{
    AudioConstraints, DeviceSelector, StreamConstraints, VideoConstraints, VideoProfile,
};
use crate::devices::DeviceEnumerator;
use crate::error::{DeviceFault, MediaError};
use crate::tracks::{DeviceKind, MediaSession};
use tracing::{info, warn};

/// A device selection change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchRequest {
    /// Switch the camera to this device id
    Camera(String),
    /// Switch the microphone to this device id
    Microphone(String),
}

impl SwitchRequest {
    pub fn kind(&self) -> DeviceKind {
        match self {
            SwitchRequest::Camera(_) => DeviceKind::Camera,
            SwitchRequest::Microphone(_) => DeviceKind::Microphone,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            SwitchRequest::Camera(id) | SwitchRequest::Microphone(id) => id,
        }
    }
}

/// Result of a switch attempt
#[derive(Debug, Clone)]
pub enum SwitchOutcome {
    /// Replacement acquired; hand it to [`DeviceSwitcher::commit`]
    Acquired(MediaSession),
    /// The device is gone; selection reverted to the first of its kind
    Reverted {
        fault: DeviceFault,
        fallback: Option<String>,
        error: MediaError,
    },
    /// Switch failed; previous session and selection stay
    Kept { fault: DeviceFault, error: MediaError },
}

impl SwitchOutcome {
    pub fn fault(&self) -> Option<&DeviceFault> {
        match self {
            SwitchOutcome::Acquired(_) => None,
            SwitchOutcome::Reverted { fault, .. } | SwitchOutcome::Kept { fault, .. } => Some(fault),
        }
    }
}

/// Re-acquires streams when the user picks another device
#[derive(Debug, Clone)]
pub struct DeviceSwitcher {
    acquirer: MediaStreamAcquirer,
}

impl DeviceSwitcher {
    pub fn new(acquirer: MediaStreamAcquirer) -> Self {
        Self { acquirer }
    }

    /// Whether `current` already carries a track from the requested device
    pub fn is_noop(request: &SwitchRequest, current: Option<&MediaSession>) -> bool {
        let Some(track_kind) = request.kind().track_kind() else {
            return false;
        };
        current
            .and_then(|session| session.track(track_kind))
            .is_some_and(|track| track.is_live() && track.device_id() == request.device_id())
    }

    /// Constraints for the replacement stream
    ///
    /// The changed device is pinned by exact id. The other modality is
    /// requested only if `current` carries a track of that kind, pinned to
    /// the device that track came from. Video keeps the resolution the live
    /// preview is actually running at.
    pub fn build_constraints(
        &self,
        request: &SwitchRequest,
        current: Option<&MediaSession>,
    ) -> StreamConstraints {
        let profile = self.current_profile(current);
        let pinned = DeviceSelector::Exact(request.device_id().to_string());

        let keep_video = current
            .and_then(|s| s.video_track())
            .map(|t| VideoConstraints::new(DeviceSelector::Exact(t.device_id().to_string()), profile));
        let keep_audio = current
            .and_then(|s| s.audio_track())
            .map(|t| AudioConstraints::with_device(DeviceSelector::Exact(t.device_id().to_string())));

        match request {
            SwitchRequest::Camera(_) => StreamConstraints {
                video: Some(VideoConstraints::new(pinned, profile)),
                audio: keep_audio,
            },
            SwitchRequest::Microphone(_) => StreamConstraints {
                video: keep_video,
                audio: Some(AudioConstraints::with_device(pinned)),
            },
        }
    }

    fn current_profile(&self, current: Option<&MediaSession>) -> VideoProfile {
        let fallback = self.acquirer.profile();
        current
            .and_then(|s| s.video_track())
            .and_then(|track| {
                let settings = track.settings();
                Some(VideoProfile {
                    resolution: settings.resolution?,
                    frame_rate: settings.frame_rate.unwrap_or(fallback.frame_rate),
                })
            })
            .unwrap_or(fallback)
    }

    /// Try to acquire a stream for the requested device
    ///
    /// Does not touch `current`; on success the caller commits the new
    /// session with [`commit`](Self::commit).
    pub async fn switch(
        &self,
        request: &SwitchRequest,
        enumerator: &DeviceEnumerator,
        current: Option<&MediaSession>,
    ) -> SwitchOutcome {
        let kind = request.kind();
        let constraints = self.build_constraints(request, current);
        info!(
            "🔀 Switching {} to {}",
            kind.display_name(),
            request.device_id()
        );

        let failure = match self.acquirer.acquire_exact(&constraints).await {
            Ok(session) => return SwitchOutcome::Acquired(session),
            Err(failure) => failure,
        };

        if failure.error.is_missing_device() {
            warn!(
                "Selected {} {} is unavailable: {}",
                kind.display_name(),
                request.device_id(),
                failure.error
            );
            if let Err(e) = enumerator.enumerate().await {
                warn!("Re-enumeration after failed switch failed: {}", e);
            }
            let fallback = enumerator.revert_to_first(kind);
            let fallback_label = fallback
                .as_deref()
                .and_then(|_| enumerator.first_of(kind))
                .map(|d| d.display_label());
            SwitchOutcome::Reverted {
                fault: DeviceFault::switch_failed(
                    kind,
                    request.device_id(),
                    fallback_label.as_deref(),
                ),
                fallback,
                error: failure.error,
            }
        } else {
            warn!(
                "Switching {} failed, keeping current session: {}",
                kind.display_name(),
                failure.error
            );
            SwitchOutcome::Kept {
                fault: DeviceFault::switch_interrupted(kind),
                error: failure.error,
            }
        }
    }

    /// Stop the previous session, adopt `next`, then record the selection
    ///
    /// Returns the number of tracks stopped.
    pub fn commit(
        request: &SwitchRequest,
        enumerator: &DeviceEnumerator,
        slot: &mut Option<MediaSession>,
        next: MediaSession,
    ) -> usize {
        let stopped = match slot.take() {
            Some(previous) if previous.id() != next.id() => previous.stop_all(),
            _ => 0,
        };
        info!(
            "✅ Switched {} to {} (session {}, stopped {} tracks)",
            request.kind().display_name(),
            request.device_id(),
            next.id(),
            stopped
        );
        *slot = Some(next);
        enumerator.select(request.kind(), request.device_id());
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMediaDevices;
    use crate::tracks::{MediaTrack, TrackKind, TrackSettings};
    use crate::VideoResolution;
    use std::sync::Arc;

    fn switcher() -> DeviceSwitcher {
        let backend = Arc::new(MockMediaDevices::with_default_hardware());
        DeviceSwitcher::new(MediaStreamAcquirer::new(backend, VideoProfile::LOBBY))
    }

    fn video_track(device: &str, resolution: VideoResolution) -> MediaTrack {
        MediaTrack::new(
            TrackKind::Video,
            device,
            "cam",
            TrackSettings {
                resolution: Some(resolution),
                frame_rate: Some(30.0),
            },
        )
    }

    fn audio_track(device: &str) -> MediaTrack {
        MediaTrack::new(TrackKind::Audio, device, "mic", TrackSettings::default())
    }

    #[test]
    fn test_camera_switch_keeps_microphone() {
        let current = MediaSession::new(
            Some(video_track("cam-1", VideoResolution::HD)),
            Some(audio_track("mic-7")),
        );
        let constraints =
            switcher().build_constraints(&SwitchRequest::Camera("cam-2".into()), Some(&current));

        let video = constraints.video.unwrap();
        assert_eq!(video.device, DeviceSelector::Exact("cam-2".into()));
        assert_eq!(video.profile.resolution, VideoResolution::HD);
        assert_eq!(video.profile.frame_rate, 30.0);
        assert_eq!(
            constraints.audio.unwrap().device,
            DeviceSelector::Exact("mic-7".into())
        );
    }

    #[test]
    fn test_missing_modality_not_requested() {
        let current = MediaSession::new(Some(video_track("cam-1", VideoResolution::VGA)), None);
        let constraints =
            switcher().build_constraints(&SwitchRequest::Camera("cam-2".into()), Some(&current));
        assert!(constraints.audio.is_none());

        let current = MediaSession::new(None, Some(audio_track("mic-1")));
        let constraints =
            switcher().build_constraints(&SwitchRequest::Microphone("mic-2".into()), Some(&current));
        assert!(constraints.video.is_none());
        assert_eq!(
            constraints.audio.unwrap().device,
            DeviceSelector::Exact("mic-2".into())
        );
    }

    #[test]
    fn test_profile_falls_back_without_video() {
        let constraints = switcher().build_constraints(&SwitchRequest::Camera("cam-2".into()), None);
        assert_eq!(constraints.video.unwrap().profile, VideoProfile::LOBBY);
    }

    #[test]
    fn test_noop_detection() {
        let current = MediaSession::new(Some(video_track("cam-1", VideoResolution::VGA)), None);
        assert!(DeviceSwitcher::is_noop(
            &SwitchRequest::Camera("cam-1".into()),
            Some(&current)
        ));
        assert!(!DeviceSwitcher::is_noop(
            &SwitchRequest::Camera("cam-2".into()),
            Some(&current)
        ));
        assert!(!DeviceSwitcher::is_noop(
            &SwitchRequest::Microphone("cam-1".into()),
            Some(&current)
        ));
    }
}
