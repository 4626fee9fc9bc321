//! # Meetlobby Media
//!
//! Camera and microphone handling for the pre-call lobby: stream
//! acquisition with graceful degradation, device enumeration and switching,
//! and live microphone level metering. All hardware access goes through the
//! [`MediaDevices`] backend trait.

#![warn(clippy::all)]

pub mod acquirer;
pub mod analyzer;
pub mod backend;
pub mod constraints;
pub mod devices;
pub mod error;
pub mod frame_loop;
pub mod mock;
pub mod switcher;
pub mod tracks;

// Re-export main types
pub use acquirer::{AcquireFailure, Acquisition, MediaStreamAcquirer, SoftFailure};
pub use analyzer::{compute_level, AnalyzerConfig, AudioLevelAnalyzer};
pub use backend::{count_devices, LevelSource, MediaDevices};
pub use constraints::{
    AudioConstraints, DeviceSelector, StreamConstraints, VideoConstraints, VideoProfile,
    VideoResolution,
};
pub use devices::{DeviceEnumerator, DeviceList, DeviceSelections};
pub use error::{
    classify, DeviceFault, ErrorCategory, ErrorClassification, ErrorKind, FaultKind, MediaError,
    MediaResult,
};
pub use frame_loop::{FrameTask, LivenessToken};
pub use mock::{MockMediaDevices, RequestShape};
pub use switcher::{DeviceSwitcher, SwitchOutcome, SwitchRequest};
pub use tracks::{
    DeviceDescriptor, DeviceKind, MediaSession, MediaTrack, TrackKind, TrackSettings,
};
