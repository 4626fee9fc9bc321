//! # meetlobby - pre-call device lobby
//!
//! The screen before a video meeting: asks for camera and microphone
//! access, lets the user pick devices and see a live preview with a
//! microphone level meter, then releases everything and hands off to the
//! conferencing service.
//!
//! ## Key Features
//!
//! - **Graceful degradation**: a missing microphone still leaves a camera preview
//! - **Acquire-then-swap**: a failed device switch never drops the preview
//! - **Platform-aware prompts**: desktop auto-requests, mobile waits for a tap
//! - **Leak-free teardown**: `cleanup()` is idempotent and runs on drop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meetlobby::{LobbyBuilder, MockMediaDevices};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(MockMediaDevices::with_default_hardware());
//!     let lobby = LobbyBuilder::new(backend)
//!         .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
//!         .build()?;
//!
//!     // Desktop: banner, then the native prompt
//!     lobby.on_context_ready().await;
//!
//!     let snapshot = lobby.snapshot();
//!     println!("Cameras: {:?}", snapshot.devices.cameras);
//!     lobby.toggle_microphone();
//!
//!     lobby.cleanup();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// Re-export core types for easy access
pub use meetlobby_core::{
    ConferenceLink, ConferenceTransport, ConnectionDetails, ConnectionState, DisconnectReason,
    HttpTokenExchange, JoinOptions, LobbyError, TokenExchange, TokenRequest,
};

pub use meetlobby_media::{
    AnalyzerConfig, DeviceDescriptor, DeviceFault, DeviceKind, DeviceList, DeviceSelections,
    ErrorClassification, ErrorKind, FaultKind, MediaDevices, MediaError, MediaSession, MediaTrack,
    MockMediaDevices, RequestShape, TrackKind, VideoProfile, VideoResolution,
};

// Public API modules
pub mod builder;
pub mod config;
pub mod event;
pub mod join;
pub mod logging;
pub mod permission;
pub mod session;

// Re-export main API types
pub use builder::LobbyBuilder;
pub use config::LobbyConfig;
pub use event::{EventStream, LobbyEvent};
pub use join::MeetingHandoff;
pub use logging::init_logging;
pub use permission::{PermissionGate, PermissionState, Platform, ReadyAction};
pub use session::{LobbySnapshot, SessionLifecycle, SwitchStatus, ToggleState};
