//! Media device error types and classification
//!
//! [`MediaError`] is the closed set of failures a platform media backend can
//! report. [`classify`] folds those into the three user-facing
//! [`ErrorKind`]s, and [`DeviceFault`] is what finally reaches the UI.

use crate::tracks::DeviceKind;
use meetlobby_core::LobbyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a media device backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user or the OS blocked access
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// No device satisfies the request
    #[error("Device not found: {device}")]
    DeviceNotFound {
        /// Device identifier or kind that was requested
        device: String,
    },

    /// A required constraint cannot be met
    #[error("Constraint cannot be satisfied: {constraint}")]
    Overconstrained {
        /// Constraint that failed
        constraint: String,
    },

    /// Hardware exists but could not be started
    #[error("Device is busy: {device}")]
    DeviceBusy {
        /// Device that is busy
        device: String,
    },

    /// The request was interrupted
    #[error("Request aborted: {reason}")]
    Aborted {
        /// Reason for the abort
        reason: String,
    },

    /// The platform cannot serve the request at all
    #[error("Unsupported: {reason}")]
    Unsupported {
        /// Why the request is unsupported
        reason: String,
    },

    /// Device enumeration failed
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumerationFailed {
        /// Failure reason
        reason: String,
    },

    /// The level analysis graph could not be built
    #[error("Audio analyzer unavailable: {reason}")]
    AnalyzerUnavailable {
        /// Failure reason
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if retrying without user action can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::PermissionDenied { .. } => false,
            MediaError::DeviceNotFound { .. } => false,
            MediaError::Overconstrained { .. } => false,
            MediaError::DeviceBusy { .. } => true,
            MediaError::Aborted { .. } => true,
            MediaError::Unsupported { .. } => false,
            MediaError::DeviceEnumerationFailed { .. } => true,
            MediaError::AnalyzerUnavailable { .. } => true,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::InvalidState { .. } => true,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::Overconstrained { .. } => ErrorCategory::Device,
            MediaError::DeviceBusy { .. } => ErrorCategory::Device,
            MediaError::Aborted { .. } => ErrorCategory::System,
            MediaError::Unsupported { .. } => ErrorCategory::Platform,
            MediaError::DeviceEnumerationFailed { .. } => ErrorCategory::Device,
            MediaError::AnalyzerUnavailable { .. } => ErrorCategory::Audio,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidState { .. } => ErrorCategory::State,
        }
    }

    /// Whether the error means the requested device is gone or unusable
    /// with the given constraints
    pub fn is_missing_device(&self) -> bool {
        matches!(
            self,
            MediaError::DeviceNotFound { .. } | MediaError::Overconstrained { .. }
        )
    }
}

impl From<MediaError> for LobbyError {
    fn from(error: MediaError) -> Self {
        LobbyError::Media {
            reason: error.to_string(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Access was refused
    Permission,
    /// Device and hardware errors
    Device,
    /// Platform capability errors
    Platform,
    /// Interrupted or transient system errors
    System,
    /// Audio analysis errors
    Audio,
    /// Configuration and parameter errors
    Configuration,
    /// State management errors
    State,
}

/// User-facing kind of an acquisition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// User or OS blocked access
    AccessDenied,
    /// No such hardware
    NotFound,
    /// Hardware busy, or anything else
    DeviceBusyOrGeneric,
}

/// Classified failure with a message fit for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    /// Failure kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl ErrorClassification {
    /// Access denied for the given kinds
    pub fn access_denied(kinds: &[DeviceKind]) -> Self {
        Self {
            kind: ErrorKind::AccessDenied,
            message: format!(
                "{} access is blocked. Allow access in your browser settings, then try again.",
                subject(kinds)
            ),
        }
    }

    /// No hardware of the given kinds
    pub fn not_found(kinds: &[DeviceKind]) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: format!(
                "No {} was found. Connect one and try again.",
                subject(kinds).to_lowercase()
            ),
        }
    }

    /// Hardware busy or a transient failure
    pub fn busy(kinds: &[DeviceKind]) -> Self {
        Self {
            kind: ErrorKind::DeviceBusyOrGeneric,
            message: format!(
                "{} could not be started. It may be in use by another application; close it and try again.",
                subject(kinds)
            ),
        }
    }

    /// Hardware is present but unreachable
    ///
    /// Used when a not-found failure is contradicted by enumeration.
    pub fn unreachable(kinds: &[DeviceKind]) -> Self {
        Self {
            kind: ErrorKind::AccessDenied,
            message: format!(
                "{} is connected but could not be accessed. Check your browser and system permissions, then try again.",
                subject(kinds)
            ),
        }
    }
}

/// Classify a backend failure for the kinds that were requested
pub fn classify(error: &MediaError, kinds: &[DeviceKind]) -> ErrorClassification {
    match error {
        MediaError::PermissionDenied { .. } => ErrorClassification::access_denied(kinds),
        MediaError::DeviceNotFound { .. } => ErrorClassification::not_found(kinds),
        MediaError::Overconstrained { .. }
        | MediaError::DeviceBusy { .. }
        | MediaError::Aborted { .. }
        | MediaError::Unsupported { .. }
        | MediaError::DeviceEnumerationFailed { .. }
        | MediaError::AnalyzerUnavailable { .. }
        | MediaError::InvalidConfiguration { .. }
        | MediaError::InvalidState { .. } => ErrorClassification::busy(kinds),
    }
}

fn subject(kinds: &[DeviceKind]) -> String {
    let camera = kinds.contains(&DeviceKind::Camera);
    let microphone = kinds.contains(&DeviceKind::Microphone);
    match (camera, microphone) {
        (true, true) => "Camera and microphone".to_string(),
        (true, false) => "Camera".to_string(),
        (false, true) => "Microphone".to_string(),
        (false, false) if kinds.contains(&DeviceKind::Speaker) => "Speaker".to_string(),
        (false, false) => "Media device".to_string(),
    }
}

/// Kind of a fault surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Access blocked; needs a settings change and an explicit retry
    AccessDenied,
    /// No hardware; plug a device in and retry
    NotFound,
    /// Transient; a retry may succeed
    DeviceBusy,
    /// A selected device became unreachable mid-session
    SwitchFailed {
        /// Kind of device whose switch failed
        device: DeviceKind,
    },
}

/// Error state shown by the lobby UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFault {
    /// Fault kind
    pub kind: FaultKind,
    /// Human-readable message
    pub message: String,
}

impl DeviceFault {
    /// Fault for a failed switch to `device_id`
    pub fn switch_failed(device: DeviceKind, device_id: &str, fell_back_to: Option<&str>) -> Self {
        let name = device.display_name();
        let message = match fell_back_to {
            Some(fallback) => format!(
                "The selected {} ({}) is no longer available. Switched back to {}.",
                name, device_id, fallback
            ),
            None => format!(
                "The selected {} ({}) is no longer available.",
                name, device_id
            ),
        };
        Self {
            kind: FaultKind::SwitchFailed { device },
            message,
        }
    }

    /// Fault for a switch that failed for any other reason
    pub fn switch_interrupted(device: DeviceKind) -> Self {
        Self {
            kind: FaultKind::DeviceBusy,
            message: format!(
                "Could not switch {}. Your current {} is still active; try again.",
                device.display_name(),
                device.display_name()
            ),
        }
    }

    /// Whether this fault needs user action before a retry helps
    pub fn needs_user_action(&self) -> bool {
        matches!(self.kind, FaultKind::AccessDenied | FaultKind::NotFound)
    }
}

impl From<ErrorClassification> for DeviceFault {
    fn from(classification: ErrorClassification) -> Self {
        let kind = match classification.kind {
            ErrorKind::AccessDenied => FaultKind::AccessDenied,
            ErrorKind::NotFound => FaultKind::NotFound,
            ErrorKind::DeviceBusyOrGeneric => FaultKind::DeviceBusy,
        };
        Self {
            kind,
            message: classification.message,
        }
    }
}
