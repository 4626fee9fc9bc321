//! Camera and microphone acquisition with graceful degradation
//!
//! A combined audio+video request is tried first. When it fails the
//! acquirer retries each modality on its own, once, and keeps whatever
//! succeeded: a user without a working microphone still gets a camera
//! preview. Only when both separate requests fail is the original combined
//! error surfaced.

use crate::backend::MediaDevices;
use crate::constraints::{
    AudioConstraints, DeviceSelector, StreamConstraints, VideoConstraints, VideoProfile,
};
use crate::error::{classify, DeviceFault, ErrorClassification, ErrorKind, MediaError};
use crate::tracks::{DeviceKind, MediaSession};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A modality that could not be acquired while the other one was
#[derive(Debug, Clone)]
pub struct SoftFailure {
    /// Device kind that failed
    pub kind: DeviceKind,
    /// Backend error
    pub error: MediaError,
    /// Classified error
    pub classification: ErrorClassification,
}

/// Outcome of a successful acquisition
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// Acquired session with one or both tracks
    pub session: MediaSession,
    /// Camera intent after acquisition
    pub camera_enabled: bool,
    /// Microphone intent after acquisition
    pub mic_enabled: bool,
    /// Modalities that had to be dropped
    pub soft_failures: Vec<SoftFailure>,
}

impl Acquisition {
    /// Whether one modality had to be dropped
    pub fn is_partial(&self) -> bool {
        !self.soft_failures.is_empty()
    }

    /// Fault to surface for a partial acquisition
    pub fn fault(&self) -> Option<DeviceFault> {
        self.soft_failures
            .first()
            .map(|failure| DeviceFault::from(failure.classification.clone()))
    }
}

/// Acquisition failed for every requested modality
#[derive(Error, Debug, Clone)]
#[error("{}", classification.message)]
pub struct AcquireFailure {
    /// Backend error that is surfaced
    pub error: MediaError,
    /// Classified error
    pub classification: ErrorClassification,
}

/// Requests camera/microphone streams from the platform
#[derive(Clone)]
pub struct MediaStreamAcquirer {
    backend: Arc<dyn MediaDevices>,
    profile: VideoProfile,
}

impl std::fmt::Debug for MediaStreamAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStreamAcquirer")
            .field("profile", &self.profile)
            .finish()
    }
}

impl MediaStreamAcquirer {
    /// Create an acquirer using `profile` for the camera preview
    pub fn new(backend: Arc<dyn MediaDevices>, profile: VideoProfile) -> Self {
        Self { backend, profile }
    }

    /// Preview profile used for combined and video-only requests
    pub fn profile(&self) -> VideoProfile {
        self.profile
    }

    /// Acquire camera and microphone, degrading to whatever is available
    ///
    /// Previously selected devices are passed as preferences, not pins.
    pub async fn acquire(
        &self,
        camera: Option<&str>,
        microphone: Option<&str>,
    ) -> Result<Acquisition, AcquireFailure> {
        let video = VideoConstraints::new(DeviceSelector::preferred(camera), self.profile);
        let audio = AudioConstraints::with_device(DeviceSelector::preferred(microphone));

        info!("🎥 Requesting camera and microphone");
        let combined_error = match self
            .backend
            .request_stream(&StreamConstraints::combined(video.clone(), audio.clone()))
            .await
        {
            Ok(session) => {
                info!(
                    "✅ Acquired session {} (video: {}, audio: {})",
                    session.id(),
                    session.has_video(),
                    session.has_audio()
                );
                return Ok(Acquisition {
                    camera_enabled: session.has_video(),
                    mic_enabled: session.has_audio(),
                    session,
                    soft_failures: Vec::new(),
                });
            }
            Err(error) => error,
        };

        warn!(
            "Combined request failed ({}), retrying each device on its own",
            combined_error
        );
        let mut soft_failures = Vec::new();

        let video_part = match self
            .backend
            .request_stream(&StreamConstraints::video_only(video))
            .await
        {
            Ok(session) => Some(session),
            Err(error) => {
                warn!("Camera unavailable: {}", error);
                soft_failures.push(self.soft_failure(DeviceKind::Camera, error).await);
                None
            }
        };

        let audio_part = match self
            .backend
            .request_stream(&StreamConstraints::audio_only(audio))
            .await
        {
            Ok(session) => Some(session),
            Err(error) => {
                warn!("Microphone unavailable: {}", error);
                soft_failures.push(self.soft_failure(DeviceKind::Microphone, error).await);
                None
            }
        };

        if video_part.is_none() && audio_part.is_none() {
            let classification = self
                .classify(
                    &combined_error,
                    &[DeviceKind::Camera, DeviceKind::Microphone],
                )
                .await;
            warn!("No media device could be acquired: {}", classification.message);
            return Err(AcquireFailure {
                error: combined_error,
                classification,
            });
        }

        let session = MediaSession::merge(video_part, audio_part);
        info!(
            "⚠️ Acquired partial session {} (video: {}, audio: {})",
            session.id(),
            session.has_video(),
            session.has_audio()
        );
        Ok(Acquisition {
            camera_enabled: session.has_video(),
            mic_enabled: session.has_audio(),
            session,
            soft_failures,
        })
    }

    /// Issue exactly one request, without fallback
    pub async fn acquire_exact(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<MediaSession, AcquireFailure> {
        match self.backend.request_stream(constraints).await {
            Ok(session) => Ok(session),
            Err(error) => {
                let classification = self.classify(&error, &constraints.requested_kinds()).await;
                Err(AcquireFailure {
                    error,
                    classification,
                })
            }
        }
    }

    /// Classify an error, probing enumeration on not-found
    ///
    /// A not-found failure while devices of every requested kind are
    /// enumerated means the hardware exists but cannot be reached.
    pub async fn classify(&self, error: &MediaError, kinds: &[DeviceKind]) -> ErrorClassification {
        let classification = classify(error, kinds);
        if classification.kind != ErrorKind::NotFound {
            return classification;
        }

        match self.backend.list_devices().await {
            Ok(devices) => {
                let all_present = !kinds.is_empty()
                    && kinds
                        .iter()
                        .all(|kind| devices.iter().any(|d| d.kind == *kind));
                if all_present {
                    debug!("Devices of {:?} are present; reclassifying as unreachable", kinds);
                    ErrorClassification::unreachable(kinds)
                } else {
                    classification
                }
            }
            Err(probe_error) => {
                debug!("Device probe failed: {}", probe_error);
                classification
            }
        }
    }

    async fn soft_failure(&self, kind: DeviceKind, error: MediaError) -> SoftFailure {
        let classification = self.classify(&error, &[kind]).await;
        SoftFailure {
            kind,
            error,
            classification,
        }
    }
}
