//! Interfaces to the external conferencing service
//!
//! The lobby never carries meeting media itself. It exchanges a meeting
//! identifier for a connection token and transport URL, then hands both to a
//! [`ConferenceTransport`] which owns the real call. Everything in this module
//! is the thin seam between the two.

use crate::error::LobbyError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request sent to the token exchange endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Meeting to join
    pub meeting_id: String,
    /// Name shown to other participants
    pub display_name: Option<String>,
}

impl TokenRequest {
    /// Create a request for the given meeting
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            display_name: None,
        }
    }

    /// Attach a display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        // Blank names are sent as absent so the service picks its own default
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

/// Token and transport URL returned by the conferencing service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    /// Opaque access token for the transport
    pub token: String,
    /// Transport URL to connect to
    #[serde(alias = "url")]
    pub server_url: String,
}

impl ConnectionDetails {
    fn validate(&self, meeting_id: &str) -> Result<(), LobbyError> {
        if self.token.is_empty() || self.server_url.is_empty() {
            return Err(LobbyError::TokenExchange {
                meeting_id: meeting_id.to_string(),
                reason: "response is missing token or server URL".to_string(),
                status: None,
            });
        }
        Ok(())
    }
}

// Tokens never end up in logs
impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("token", &"<redacted>")
            .field("server_url", &self.server_url)
            .finish()
    }
}

/// Exchanges a meeting identifier for connection details
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Request a token for the meeting
    async fn exchange(&self, request: &TokenRequest) -> Result<ConnectionDetails, LobbyError>;
}

/// Token exchange over HTTP
///
/// Issues `POST {base_url}/meetings/{meeting_id}/token` with an optional
/// `displayName` body and expects `{"token": ..., "serverUrl": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpTokenExchange {
    /// Create a client for the service rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Endpoint URL for a meeting, with the identifier percent-encoded
    pub fn endpoint(&self, meeting_id: &str) -> Result<reqwest::Url, LobbyError> {
        let mut url =
            reqwest::Url::parse(&self.base_url).map_err(|e| LobbyError::InvalidConfiguration {
                reason: format!("token service URL {:?}: {}", self.base_url, e),
            })?;

        url.path_segments_mut()
            .map_err(|_| LobbyError::InvalidConfiguration {
                reason: format!("token service URL {:?} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(["meetings", meeting_id, "token"]);

        Ok(url)
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, request: &TokenRequest) -> Result<ConnectionDetails, LobbyError> {
        let meeting_id = request.meeting_id.trim();
        if meeting_id.is_empty() {
            return Err(LobbyError::MissingConfiguration {
                field: "meeting_id".to_string(),
            });
        }

        let url = self.endpoint(meeting_id)?;
        debug!("🎟️ Requesting meeting token from {}", url);

        let failure = |reason: String, status: Option<u16>| LobbyError::TokenExchange {
            meeting_id: meeting_id.to_string(),
            reason,
            status,
        };

        let mut builder = self.client.post(url).json(&TokenRequestBody {
            display_name: request.display_name.as_deref(),
        });
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| failure(e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token service answered {} for meeting {}", status, meeting_id);
            return Err(failure(
                format!("service answered {}: {}", status, body.trim()),
                Some(status.as_u16()),
            ));
        }

        let details: ConnectionDetails = response
            .json()
            .await
            .map_err(|e| failure(format!("malformed response: {}", e), Some(status.as_u16())))?;
        details.validate(meeting_id)?;

        info!("🎟️ Received meeting token for {}", meeting_id);
        Ok(details)
    }
}

/// Why the conferencing transport disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// No reason given
    Unknown,
    /// The local participant left
    ClientInitiated,
    /// Another session joined with the same identity
    DuplicateIdentity,
    /// The server is shutting down
    ServerShutdown,
    /// A moderator removed the participant
    ParticipantRemoved,
    /// The meeting was closed
    RoomDeleted,
    /// Client and server disagree about session state
    StateMismatch,
    /// The join handshake did not complete
    JoinFailure,
    /// A code this client does not know
    Other(u32),
}

impl DisconnectReason {
    /// Map a wire reason code
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DisconnectReason::Unknown,
            1 => DisconnectReason::ClientInitiated,
            2 => DisconnectReason::DuplicateIdentity,
            3 => DisconnectReason::ServerShutdown,
            4 => DisconnectReason::ParticipantRemoved,
            5 => DisconnectReason::RoomDeleted,
            6 => DisconnectReason::StateMismatch,
            7 => DisconnectReason::JoinFailure,
            other => DisconnectReason::Other(other),
        }
    }

    /// Wire reason code
    pub fn code(&self) -> u32 {
        match self {
            DisconnectReason::Unknown => 0,
            DisconnectReason::ClientInitiated => 1,
            DisconnectReason::DuplicateIdentity => 2,
            DisconnectReason::ServerShutdown => 3,
            DisconnectReason::ParticipantRemoved => 4,
            DisconnectReason::RoomDeleted => 5,
            DisconnectReason::StateMismatch => 6,
            DisconnectReason::JoinFailure => 7,
            DisconnectReason::Other(code) => *code,
        }
    }

    /// Whether the local participant caused the disconnect
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ClientInitiated)
    }

    /// Whether rejoining the same meeting may work
    pub fn can_rejoin(&self) -> bool {
        !matches!(
            self,
            DisconnectReason::ParticipantRemoved
                | DisconnectReason::RoomDeleted
                | DisconnectReason::DuplicateIdentity
        )
    }
}

/// Device choices carried from the lobby into the meeting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOptions {
    /// Publish camera on join
    pub camera_enabled: bool,
    /// Publish microphone on join
    pub mic_enabled: bool,
    /// Camera picked in the lobby
    pub camera_device_id: Option<String>,
    /// Microphone picked in the lobby
    pub mic_device_id: Option<String>,
    /// Speaker picked in the lobby
    pub speaker_device_id: Option<String>,
}

/// The real-time transport that runs the meeting
#[async_trait]
pub trait ConferenceTransport: Send + Sync {
    /// Connect using the exchanged details
    async fn connect(
        &self,
        details: &ConnectionDetails,
        options: &JoinOptions,
    ) -> Result<(), LobbyError>;

    /// Disconnect with a reason
    async fn disconnect(&self, reason: DisconnectReason);
}

/// Connection state of a [`ConferenceLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Dialing the transport
    Connecting,
    /// Connected to the meeting
    Connected,
}

/// A connected meeting handed off from the lobby
pub struct ConferenceLink {
    transport: Arc<dyn ConferenceTransport>,
    details: ConnectionDetails,
    options: JoinOptions,
    state: RwLock<ConnectionState>,
    last_disconnect: RwLock<Option<DisconnectReason>>,
}

impl fmt::Debug for ConferenceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConferenceLink")
            .field("details", &self.details)
            .field("options", &self.options)
            .field("state", &*self.state.read())
            .field("last_disconnect", &*self.last_disconnect.read())
            .finish()
    }
}

impl ConferenceLink {
    /// Connect the transport and return the live link
    pub async fn connect(
        transport: Arc<dyn ConferenceTransport>,
        details: ConnectionDetails,
        options: JoinOptions,
    ) -> Result<Self, LobbyError> {
        let link = Self {
            transport,
            details,
            options,
            state: RwLock::new(ConnectionState::Connecting),
            last_disconnect: RwLock::new(None),
        };

        info!("📞 Connecting to conference at {}", link.details.server_url);
        if let Err(e) = link.transport.connect(&link.details, &link.options).await {
            *link.state.write() = ConnectionState::Disconnected;
            *link.last_disconnect.write() = Some(DisconnectReason::JoinFailure);
            warn!("Conference connect failed: {}", e);
            return Err(e);
        }

        *link.state.write() = ConnectionState::Connected;
        info!("✅ Connected to conference");
        Ok(link)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Details used to connect
    pub fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    /// Device choices the meeting was joined with
    pub fn options(&self) -> &JoinOptions {
        &self.options
    }

    /// Reason for the most recent disconnect
    pub fn last_disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.last_disconnect.read()
    }

    /// Record a disconnect reported by the transport
    pub fn handle_disconnect(&self, reason: DisconnectReason) {
        let mut state = self.state.write();
        if *state == ConnectionState::Disconnected {
            return;
        }
        *state = ConnectionState::Disconnected;
        *self.last_disconnect.write() = Some(reason);
        info!(
            "📴 Conference disconnected: {:?} (code {})",
            reason,
            reason.code()
        );
    }

    /// Leave the meeting
    pub async fn leave(&self) {
        if self.state() == ConnectionState::Disconnected {
            debug!("Leave requested on a disconnected link");
            return;
        }
        self.transport
            .disconnect(DisconnectReason::ClientInitiated)
            .await;
        self.handle_disconnect(DisconnectReason::ClientInitiated);
    }
}
