//! Error types for the meetlobby workspace

use thiserror::Error;

/// Main error type for lobby operations that cross crate boundaries
#[derive(Error, Debug)]
pub enum LobbyError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Media device error surfaced through the lobby
    #[error("Media device error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Token exchange with the conferencing service failed
    #[error("Token exchange failed for meeting {meeting_id}: {reason}")]
    TokenExchange {
        /// Meeting the token was requested for
        meeting_id: String,
        /// Reason for the failure
        reason: String,
        /// HTTP status, when the service answered
        status: Option<u16>,
    },

    /// Connecting to the conferencing transport failed
    #[error("Connection to {server_url} failed: {reason}")]
    Connection {
        /// Transport URL that was dialed
        server_url: String,
        /// Reason for connection failure
        reason: String,
    },
}

impl LobbyError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            LobbyError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            LobbyError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            LobbyError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            LobbyError::InvalidState { .. } => "INVALID_STATE".to_string(),
            LobbyError::Media { .. } => "MEDIA_DEVICE_ERROR".to_string(),
            LobbyError::TokenExchange { .. } => "TOKEN_EXCHANGE_FAILED".to_string(),
            LobbyError::Connection { .. } => "CONNECTION_FAILED".to_string(),
        }
    }

    /// Check whether retrying the same operation can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            LobbyError::Initialization { .. } => false,
            LobbyError::MissingConfiguration { .. } => false,
            LobbyError::InvalidConfiguration { .. } => false,
            LobbyError::InvalidState { .. } => true,
            LobbyError::Media { .. } => true,
            // 4xx answers mean the request itself is wrong
            LobbyError::TokenExchange { status, .. } => {
                !matches!(status, Some(code) if (400..500).contains(code))
            }
            LobbyError::Connection { .. } => true,
        }
    }
}
