//! Scripted media backend for tests, demos and unsupported platforms
//!
//! Behaves like a browser media API with scriptable failures: labels are
//! withheld until the first successful request, missing exact devices are
//! overconstrained, and issued tracks are remembered until they end so
//! callers can count what is still holding hardware.

use crate::analyzer::AnalyzerConfig;
use crate::backend::{LevelSource, MediaDevices};
use crate::constraints::{DeviceSelector, StreamConstraints};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{
    DeviceDescriptor, DeviceKind, MediaSession, MediaTrack, TrackKind, TrackSettings,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shape of a stream request, for scripting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestShape {
    /// Camera and microphone together
    Combined,
    /// Camera only
    VideoOnly,
    /// Microphone only
    AudioOnly,
}

impl RequestShape {
    fn of(constraints: &StreamConstraints) -> Option<Self> {
        match (constraints.video.is_some(), constraints.audio.is_some()) {
            (true, true) => Some(RequestShape::Combined),
            (true, false) => Some(RequestShape::VideoOnly),
            (false, true) => Some(RequestShape::AudioOnly),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceDescriptor>,
    granted: bool,
    shape_failures: HashMap<RequestShape, MediaError>,
    device_failures: HashMap<String, MediaError>,
    enumeration_failure: Option<MediaError>,
    analyzer_failure: Option<MediaError>,
    request_delay: Option<Duration>,
    requests: Vec<StreamConstraints>,
    issued: Vec<MediaTrack>,
}

/// Scripted [`MediaDevices`] implementation
#[derive(Debug, Default)]
pub struct MockMediaDevices {
    state: Mutex<MockState>,
    input_level: Arc<AtomicU8>,
    analyzers_built: AtomicUsize,
    analyzers_open: Arc<AtomicUsize>,
}

impl MockMediaDevices {
    /// Backend with no hardware
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with the given devices
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let mock = Self::new();
        mock.state.lock().devices = devices;
        mock
    }

    /// One camera, one microphone and one speaker
    pub fn with_default_hardware() -> Self {
        Self::with_devices(vec![
            DeviceDescriptor::new("cam-1", DeviceKind::Camera, "Integrated Camera"),
            DeviceDescriptor::new("mic-1", DeviceKind::Microphone, "Built-in Microphone"),
            DeviceDescriptor::new("spk-1", DeviceKind::Speaker, "Built-in Speakers"),
        ])
    }

    /// Plug a device in
    pub fn add_device(&self, device: DeviceDescriptor) {
        self.state.lock().devices.push(device);
    }

    /// Unplug a device
    pub fn remove_device(&self, id: &str) {
        self.state.lock().devices.retain(|d| d.id != id);
    }

    /// Fail every request of this shape
    pub fn fail_requests(&self, shape: RequestShape, error: MediaError) {
        self.state.lock().shape_failures.insert(shape, error);
    }

    /// Stop failing requests of this shape
    pub fn clear_request_failure(&self, shape: RequestShape) {
        self.state.lock().shape_failures.remove(&shape);
    }

    /// Fail any request that resolves to this device
    pub fn fail_device(&self, id: &str, error: MediaError) {
        self.state.lock().device_failures.insert(id.to_string(), error);
    }

    /// Stop failing requests for this device
    pub fn clear_device_failure(&self, id: &str) {
        self.state.lock().device_failures.remove(id);
    }

    /// Fail device enumeration
    pub fn fail_enumeration(&self, error: Option<MediaError>) {
        self.state.lock().enumeration_failure = error;
    }

    /// Fail analyzer construction
    pub fn fail_analyzer(&self, error: Option<MediaError>) {
        self.state.lock().analyzer_failure = error;
    }

    /// Hold every stream request for `delay` before answering
    pub fn set_request_delay(&self, delay: Option<Duration>) {
        self.state.lock().request_delay = delay;
    }

    /// Simulated microphone input: 0 is silence, 255 a full-scale tone
    pub fn set_input_level(&self, level: u8) {
        self.input_level.store(level, Ordering::Release);
    }

    /// Number of stream requests made so far
    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Every stream request made so far
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.state.lock().requests.clone()
    }

    /// Issued tracks of this kind that still hold their device
    pub fn live_tracks(&self, kind: TrackKind) -> usize {
        self.state
            .lock()
            .issued
            .iter()
            .filter(|t| t.kind() == kind && t.is_live())
            .count()
    }

    /// Issued tracks the mock still remembers
    ///
    /// Ended tracks are forgotten on the next successful request.
    pub fn remembered_tracks(&self) -> usize {
        self.state.lock().issued.len()
    }

    /// Issued tracks of any kind that still hold their device
    pub fn total_live_tracks(&self) -> usize {
        self.live_tracks(TrackKind::Audio) + self.live_tracks(TrackKind::Video)
    }

    /// Number of analyzer nodes built so far
    pub fn analyzers_built(&self) -> usize {
        self.analyzers_built.load(Ordering::Acquire)
    }

    /// Number of analyzer nodes built and not yet closed
    pub fn analyzers_open(&self) -> usize {
        self.analyzers_open.load(Ordering::Acquire)
    }

    fn resolve(
        state: &MockState,
        kind: DeviceKind,
        selector: &DeviceSelector,
    ) -> MediaResult<DeviceDescriptor> {
        let mut candidates = state.devices.iter().filter(|d| d.kind == kind);
        let device = match selector {
            DeviceSelector::Default => candidates.next().cloned(),
            DeviceSelector::Preferred(id) => {
                let all: Vec<&DeviceDescriptor> = candidates.collect();
                all.iter()
                    .find(|d| &d.id == id)
                    .or_else(|| all.first())
                    .map(|d| (*d).clone())
            }
            DeviceSelector::Exact(id) => match candidates.find(|d| &d.id == id) {
                Some(device) => Some(device.clone()),
                None => {
                    return Err(MediaError::Overconstrained {
                        constraint: format!("deviceId {}", id),
                    })
                }
            },
        };

        let device = device.ok_or_else(|| MediaError::DeviceNotFound {
            device: kind.display_name().to_string(),
        })?;

        if let Some(error) = state.device_failures.get(&device.id) {
            return Err(error.clone());
        }
        Ok(device)
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn request_stream(&self, constraints: &StreamConstraints) -> MediaResult<MediaSession> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(constraints.clone());
            state.request_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        constraints.validate()?;

        let mut state = self.state.lock();
        if let Some(shape) = RequestShape::of(constraints) {
            if let Some(error) = state.shape_failures.get(&shape) {
                debug!("Mock request {:?} scripted to fail: {}", shape, error);
                return Err(error.clone());
            }
        }

        let video = match &constraints.video {
            Some(video) => {
                let device = Self::resolve(&state, DeviceKind::Camera, &video.device)?;
                let settings = TrackSettings {
                    resolution: Some(video.profile.resolution),
                    frame_rate: Some(video.profile.frame_rate),
                };
                Some((device, settings))
            }
            None => None,
        };
        let audio = match &constraints.audio {
            Some(audio) => Some(Self::resolve(&state, DeviceKind::Microphone, &audio.device)?),
            None => None,
        };

        // All devices resolved; only now is any hardware claimed
        let video = video.map(|(device, settings)| {
            MediaTrack::new(TrackKind::Video, device.id, device.label, settings)
        });
        let audio = audio.map(|device| {
            MediaTrack::new(
                TrackKind::Audio,
                device.id,
                device.label,
                TrackSettings::default(),
            )
        });

        state.issued.retain(|t| t.is_live());
        state.issued.extend(video.iter().cloned());
        state.issued.extend(audio.iter().cloned());
        state.granted = true;

        Ok(MediaSession::new(video, audio))
    }

    async fn list_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        let state = self.state.lock();
        if let Some(error) = &state.enumeration_failure {
            return Err(error.clone());
        }

        let devices = state
            .devices
            .iter()
            .map(|d| {
                let mut device = d.clone();
                if !state.granted {
                    device.label.clear();
                }
                device
            })
            .collect();
        Ok(devices)
    }

    fn build_analyzer(
        &self,
        track: &MediaTrack,
        config: &AnalyzerConfig,
    ) -> MediaResult<Box<dyn LevelSource>> {
        if let Some(error) = &self.state.lock().analyzer_failure {
            return Err(error.clone());
        }
        if track.kind() != TrackKind::Audio {
            return Err(MediaError::AnalyzerUnavailable {
                reason: format!("track {} is not an audio track", track.id()),
            });
        }

        self.analyzers_built.fetch_add(1, Ordering::AcqRel);
        self.analyzers_open.fetch_add(1, Ordering::AcqRel);

        Ok(Box::new(MockLevelSource {
            track: track.clone(),
            input_level: self.input_level.clone(),
            open: self.analyzers_open.clone(),
            bins: config.fft_size / 2,
            closed: false,
        }))
    }
}

struct MockLevelSource {
    track: MediaTrack,
    input_level: Arc<AtomicU8>,
    open: Arc<AtomicUsize>,
    bins: usize,
    closed: bool,
}

impl LevelSource for MockLevelSource {
    fn bin_count(&self) -> usize {
        self.bins
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        // Ended or muted tracks feed silence into the graph
        let level = if self.closed || !self.track.is_live() || !self.track.is_enabled() {
            0
        } else {
            self.input_level.load(Ordering::Acquire)
        };
        bins.fill(level);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for MockLevelSource {
    fn drop(&mut self) {
        self.close();
    }
}
