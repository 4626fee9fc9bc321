//! Platform media device backend
//!
//! The lobby talks to cameras and microphones only through [`MediaDevices`].
//! In a browser build this is a thin binding over `navigator.mediaDevices`
//! and the Web Audio analyser; tests and demos use
//! [`MockMediaDevices`](crate::mock::MockMediaDevices).

use crate::analyzer::AnalyzerConfig;
use crate::constraints::StreamConstraints;
use crate::error::MediaResult;
use crate::tracks::{DeviceDescriptor, DeviceKind, MediaSession, MediaTrack};
use async_trait::async_trait;

/// Platform media device API
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request a stream satisfying the constraints
    async fn request_stream(&self, constraints: &StreamConstraints) -> MediaResult<MediaSession>;

    /// List input and output devices
    async fn list_devices(&self) -> MediaResult<Vec<DeviceDescriptor>>;

    /// Build a frequency analysis node fed by an audio track
    fn build_analyzer(
        &self,
        track: &MediaTrack,
        config: &AnalyzerConfig,
    ) -> MediaResult<Box<dyn LevelSource>>;
}

/// Frequency-domain view of a live audio track
pub trait LevelSource: Send {
    /// Number of frequency bins
    fn bin_count(&self) -> usize;

    /// Fill `bins` with byte magnitudes (0..=255) for the current frame
    fn read_frequency_data(&mut self, bins: &mut [u8]);

    /// Disconnect the node from its source
    fn close(&mut self);
}

/// Count enumerated devices of one kind
pub async fn count_devices(backend: &dyn MediaDevices, kind: DeviceKind) -> MediaResult<usize> {
    Ok(backend
        .list_devices()
        .await?
        .iter()
        .filter(|d| d.kind == kind)
        .count())
}
