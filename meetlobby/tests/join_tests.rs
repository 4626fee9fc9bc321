//! Lobby to meeting handoff tests

use async_trait::async_trait;
use meetlobby::*;
use parking_lot::Mutex;
use std::sync::Arc;

struct StaticExchange {
    requests: Mutex<Vec<TokenRequest>>,
    fail: bool,
}

impl StaticExchange {
    fn new(fail: bool) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail,
        }
    }
}

#[async_trait]
impl TokenExchange for StaticExchange {
    async fn exchange(&self, request: &TokenRequest) -> Result<ConnectionDetails, LobbyError> {
        self.requests.lock().push(request.clone());
        if self.fail {
            return Err(LobbyError::TokenExchange {
                meeting_id: request.meeting_id.clone(),
                reason: "meeting not found".to_string(),
                status: Some(404),
            });
        }
        Ok(ConnectionDetails {
            token: "tok-123".to_string(),
            server_url: "wss://sfu.example.com".to_string(),
        })
    }
}

/// Records what the lobby still held when the meeting connected
struct RecordingTransport {
    backend: Arc<MockMediaDevices>,
    live_at_connect: Mutex<Option<usize>>,
    options: Mutex<Option<JoinOptions>>,
    disconnects: Mutex<Vec<DisconnectReason>>,
}

#[async_trait]
impl ConferenceTransport for RecordingTransport {
    async fn connect(
        &self,
        _details: &ConnectionDetails,
        options: &JoinOptions,
    ) -> Result<(), LobbyError> {
        *self.live_at_connect.lock() = Some(self.backend.total_live_tracks());
        *self.options.lock() = Some(options.clone());
        Ok(())
    }

    async fn disconnect(&self, reason: DisconnectReason) {
        self.disconnects.lock().push(reason);
    }
}

fn transport_for(backend: &Arc<MockMediaDevices>) -> Arc<RecordingTransport> {
    Arc::new(RecordingTransport {
        backend: backend.clone(),
        live_at_connect: Mutex::new(None),
        options: Mutex::new(None),
        disconnects: Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn test_join_releases_devices_before_connect() -> anyhow::Result<()> {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = LobbyBuilder::new(backend.clone()).build()?;
    lobby.on_context_ready().await;
    lobby.toggle_camera();
    lobby.select_speaker("spk-1");

    let exchange = Arc::new(StaticExchange::new(false));
    let transport = transport_for(&backend);
    let handoff = MeetingHandoff::new(exchange.clone(), transport.clone());

    let link = handoff.join(&lobby, "standup", Some("  Sam  ")).await?;

    assert_eq!(*transport.live_at_connect.lock(), Some(0));
    assert!(lobby.is_closed());
    assert_eq!(link.state(), ConnectionState::Connected);
    assert_eq!(link.details().server_url, "wss://sfu.example.com");

    let options = transport.options.lock().clone().unwrap();
    assert!(!options.camera_enabled);
    assert!(options.mic_enabled);
    assert_eq!(options.camera_device_id.as_deref(), Some("cam-1"));
    assert_eq!(options.speaker_device_id.as_deref(), Some("spk-1"));

    let request = exchange.requests.lock()[0].clone();
    assert_eq!(request.meeting_id, "standup");
    assert_eq!(request.display_name.as_deref(), Some("Sam"));

    link.leave().await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(
        link.last_disconnect_reason(),
        Some(DisconnectReason::ClientInitiated)
    );
    assert_eq!(
        *transport.disconnects.lock(),
        vec![DisconnectReason::ClientInitiated]
    );
    Ok(())
}

#[tokio::test]
async fn test_join_without_devices() -> anyhow::Result<()> {
    let backend = Arc::new(MockMediaDevices::new());
    let lobby = LobbyBuilder::new(backend.clone()).build()?;
    assert_eq!(lobby.on_context_ready().await, PermissionState::Denied);

    let handoff = MeetingHandoff::new(
        Arc::new(StaticExchange::new(false)),
        transport_for(&backend),
    );
    let link = handoff.join(&lobby, "standup", None).await?;

    assert!(!link.options().camera_enabled);
    assert!(!link.options().mic_enabled);
    Ok(())
}

#[tokio::test]
async fn test_token_failure_surfaces() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = LobbyBuilder::new(backend.clone()).build().unwrap();
    lobby.on_context_ready().await;
    let transport = transport_for(&backend);
    let handoff = MeetingHandoff::new(Arc::new(StaticExchange::new(true)), transport.clone());

    let err = handoff.join(&lobby, "missing", None).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(err.error_code(), "TOKEN_EXCHANGE_FAILED");
    assert!(transport.live_at_connect.lock().is_none());
    assert_eq!(backend.total_live_tracks(), 0);
}

#[tokio::test]
async fn test_blank_meeting_id_rejected_before_cleanup() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = LobbyBuilder::new(backend.clone()).build().unwrap();
    lobby.on_context_ready().await;
    let handoff = MeetingHandoff::new(
        Arc::new(StaticExchange::new(false)),
        transport_for(&backend),
    );

    let err = handoff.join(&lobby, "  ", None).await.unwrap_err();

    assert!(matches!(err, LobbyError::MissingConfiguration { .. }));
    assert!(!lobby.is_closed());
    assert_eq!(backend.total_live_tracks(), 2);
}
