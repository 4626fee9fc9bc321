//! Lobby walkthrough
//!
//! Runs a full pre-call lobby against the scripted device backend: the
//! desktop prompt, a busy microphone, a camera switch that fails and one that
//! succeeds, then the handoff into a (pretend) meeting.
//!
//! Run with `RUST_LOG=meetlobby=debug` for the full trace.

use async_trait::async_trait;
use meetlobby::*;
use std::sync::Arc;
use std::time::Duration;

/// Hands out a fixed token instead of calling a real service
struct DemoExchange;

#[async_trait]
impl TokenExchange for DemoExchange {
    async fn exchange(&self, request: &TokenRequest) -> Result<ConnectionDetails, LobbyError> {
        println!(
            "   🎟️ Token requested for '{}' as {:?}",
            request.meeting_id, request.display_name
        );
        Ok(ConnectionDetails {
            token: "demo-token".to_string(),
            server_url: "wss://sfu.demo.local".to_string(),
        })
    }
}

/// Prints what the meeting would be joined with
struct DemoTransport {
    backend: Arc<MockMediaDevices>,
}

#[async_trait]
impl ConferenceTransport for DemoTransport {
    async fn connect(
        &self,
        details: &ConnectionDetails,
        options: &JoinOptions,
    ) -> Result<(), LobbyError> {
        println!("   📞 Connecting to {}", details.server_url);
        println!(
            "   📷 camera={} ({:?})  🎤 mic={} ({:?})",
            options.camera_enabled,
            options.camera_device_id,
            options.mic_enabled,
            options.mic_device_id
        );
        println!(
            "   🔒 Lobby tracks still live: {}",
            self.backend.total_live_tracks()
        );
        Ok(())
    }

    async fn disconnect(&self, reason: DisconnectReason) {
        println!("   📴 Disconnected: {:?}", reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🚪 meetlobby walkthrough");
    println!("========================\n");

    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Webcam"));
    backend.set_input_level(96);

    // The microphone is held by another application
    backend.fail_requests(
        RequestShape::Combined,
        MediaError::DeviceBusy {
            device: "microphone".into(),
        },
    );
    backend.fail_requests(
        RequestShape::AudioOnly,
        MediaError::DeviceBusy {
            device: "microphone".into(),
        },
    );

    let lobby = LobbyBuilder::new(backend.clone())
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0")
        .debug_logging(true)
        .build()?;

    let mut events = lobby.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            println!("   📣 event: {}", event.event_type());
        }
    });

    println!("1️⃣ Opening the lobby on {:?}", lobby.platform());
    let state = lobby.on_context_ready().await;
    let snapshot = lobby.snapshot();
    println!("   Permission: {}", state);
    println!("   Toggles: {:?}", snapshot.toggles);
    if let Some(fault) = &snapshot.error {
        println!("   ⚠️ {:?}: {}", fault.kind, fault.message);
    }

    println!("\n2️⃣ Freeing the microphone and retrying");
    backend.clear_request_failure(RequestShape::Combined);
    backend.clear_request_failure(RequestShape::AudioOnly);
    lobby.retry().await;
    // The busy microphone switched its intent off; turn it back on
    if !lobby.toggles().mic_enabled {
        lobby.toggle_microphone();
    }
    for camera in &lobby.devices().cameras {
        println!("   📷 {} ({})", camera.label, camera.id);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("   🎚️ Level: {:.2}", *lobby.audio_level().borrow());

    println!("\n3️⃣ Switching cameras");
    backend.remove_device("cam-2");
    let status = lobby.select_camera("cam-2").await;
    println!("   Unplugged webcam: {:?}", status);
    if let Some(fault) = lobby.error() {
        println!("   ⚠️ {}", fault.message);
    }
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Webcam"));
    let status = lobby.select_camera("cam-2").await;
    println!("   Plugged back in: {:?}", status);
    println!("   Selections: {:?}", lobby.selections());

    println!("\n4️⃣ Muting the microphone");
    lobby.toggle_microphone();
    println!("   🎚️ Level: {:.2}", *lobby.audio_level().borrow());

    println!("\n5️⃣ Joining the meeting");
    let handoff = MeetingHandoff::new(
        Arc::new(DemoExchange),
        Arc::new(DemoTransport {
            backend: backend.clone(),
        }),
    );
    let link = handoff.join(&lobby, "weekly-sync", Some("Demo User")).await?;
    println!("   State: {:?}", link.state());
    link.leave().await;

    drop(lobby);
    let _ = printer.await;

    println!("\n✅ Walkthrough complete");
    Ok(())
}
