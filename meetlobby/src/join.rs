//! Handoff from the lobby into the meeting
//!
//! The lobby releases its camera and microphone before the conferencing
//! transport starts, so the two never hold the same hardware at once.

use crate::session::SessionLifecycle;
use meetlobby_core::{
    ConferenceLink, ConferenceTransport, LobbyError, TokenExchange, TokenRequest,
};
use std::sync::Arc;
use tracing::info;

/// Joins a meeting with the choices made in a lobby
#[derive(Clone)]
pub struct MeetingHandoff {
    exchange: Arc<dyn TokenExchange>,
    transport: Arc<dyn ConferenceTransport>,
}

impl std::fmt::Debug for MeetingHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeetingHandoff").finish_non_exhaustive()
    }
}

impl MeetingHandoff {
    pub fn new(exchange: Arc<dyn TokenExchange>, transport: Arc<dyn ConferenceTransport>) -> Self {
        Self {
            exchange,
            transport,
        }
    }

    /// Clean up the lobby, exchange a token and connect
    pub async fn join(
        &self,
        lobby: &SessionLifecycle,
        meeting_id: &str,
        display_name: Option<&str>,
    ) -> Result<ConferenceLink, LobbyError> {
        if meeting_id.trim().is_empty() {
            return Err(LobbyError::MissingConfiguration {
                field: "meeting_id".to_string(),
            });
        }

        let options = lobby.join_options();
        let released = lobby.cleanup();
        info!(
            "🚀 Joining meeting {} (released {} lobby tracks)",
            meeting_id, released
        );

        let mut request = TokenRequest::new(meeting_id);
        if let Some(name) = display_name {
            request = request.with_display_name(name);
        }
        let details = self.exchange.exchange(&request).await?;

        ConferenceLink::connect(self.transport.clone(), details, options).await
    }
}
