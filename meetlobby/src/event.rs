//! Event system for lobby state changes

use crate::permission::PermissionState;
use meetlobby_media::{DeviceFault, DeviceKind, DeviceList};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Lobby events that can occur while setting up devices
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// Permission state changed
    PermissionChanged {
        /// New state
        state: PermissionState,
    },
    /// The permission banner or allow button appeared or went away
    PromptVisibilityChanged {
        /// Whether the banner is visible
        banner_visible: bool,
        /// Whether the allow button is visible
        allow_button_visible: bool,
    },
    /// Device lists were re-enumerated
    DevicesChanged {
        /// New device lists
        devices: DeviceList,
    },
    /// A device selection changed
    SelectionChanged {
        /// Kind of device
        kind: DeviceKind,
        /// Newly selected device id
        device_id: Option<String>,
    },
    /// Camera or microphone intent changed
    ToggleChanged {
        /// Kind of device
        kind: DeviceKind,
        /// Whether it is now enabled
        enabled: bool,
    },
    /// The live preview stream was replaced or removed
    StreamChanged {
        /// New session, if any
        session_id: Option<Uuid>,
    },
    /// A device fault was raised
    ErrorRaised {
        /// The fault
        fault: DeviceFault,
    },
    /// The device fault was cleared
    ErrorCleared,
    /// All lobby media was released
    CleanedUp {
        /// Number of tracks that were stopped
        tracks_stopped: usize,
    },
}

impl LobbyEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LobbyEvent::PermissionChanged { .. } => "permission_changed",
            LobbyEvent::PromptVisibilityChanged { .. } => "prompt_visibility_changed",
            LobbyEvent::DevicesChanged { .. } => "devices_changed",
            LobbyEvent::SelectionChanged { .. } => "selection_changed",
            LobbyEvent::ToggleChanged { .. } => "toggle_changed",
            LobbyEvent::StreamChanged { .. } => "stream_changed",
            LobbyEvent::ErrorRaised { .. } => "error_raised",
            LobbyEvent::ErrorCleared => "error_cleared",
            LobbyEvent::CleanedUp { .. } => "cleaned_up",
        }
    }

    /// Check if this is an error-related event
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            LobbyEvent::ErrorRaised { .. } | LobbyEvent::ErrorCleared
        )
    }

    /// Check if this is a device-related event
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            LobbyEvent::DevicesChanged { .. }
                | LobbyEvent::SelectionChanged { .. }
                | LobbyEvent::ToggleChanged { .. }
                | LobbyEvent::StreamChanged { .. }
        )
    }
}

/// Stream of lobby events
///
/// A slow reader that falls behind the channel capacity skips the events it
/// missed instead of failing.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<LobbyEvent>,
    skipped: u64,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<LobbyEvent>) -> Self {
        Self {
            receiver,
            skipped: 0,
        }
    }

    /// Wait for the next event; `None` once the lobby is gone
    pub async fn next(&mut self) -> Option<LobbyEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Event stream lagged, skipped {} events", n);
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready
    pub fn try_next(&mut self) -> Option<LobbyEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    debug!("Event stream lagged, skipped {} events", n);
                    self.skipped += n;
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every ready event
    pub fn drain(&mut self) -> Vec<LobbyEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Number of events skipped because the reader lagged
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
