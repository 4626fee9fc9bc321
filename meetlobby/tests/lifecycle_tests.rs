//! End-to-end lobby tests
//!
//! Each test drives a [`SessionLifecycle`] through its public actions on top
//! of the scripted media backend.

use meetlobby::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const DESKTOP_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const MOBILE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";

fn lobby_with(backend: &Arc<MockMediaDevices>, user_agent: &str) -> SessionLifecycle {
    assert_ok!(LobbyBuilder::new(backend.clone())
        .user_agent(user_agent)
        .build())
}

async fn granted_lobby(backend: &Arc<MockMediaDevices>) -> SessionLifecycle {
    let lobby = lobby_with(backend, DESKTOP_UA);
    assert_eq!(lobby.on_context_ready().await, PermissionState::Granted);
    lobby
}

async fn next_frames() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_happy_path() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;

    let snapshot = lobby.snapshot();
    assert!(!snapshot.devices.cameras.is_empty());
    assert!(!snapshot.devices.microphones.is_empty());
    assert_eq!(
        snapshot.selections.camera.as_deref(),
        Some(snapshot.devices.cameras[0].id.as_str())
    );
    assert_eq!(
        snapshot.selections.microphone.as_deref(),
        Some(snapshot.devices.microphones[0].id.as_str())
    );
    assert_eq!(snapshot.devices.cameras[0].label, "Integrated Camera");
    assert!(snapshot.toggles.camera_enabled);
    assert!(snapshot.toggles.mic_enabled);
    assert!(snapshot.error.is_none());
    assert!(!snapshot.banner_visible);

    next_frames().await;
    assert_eq!(lobby.snapshot().audio_level, 0.0);

    backend.set_input_level(200);
    next_frames().await;
    assert!(lobby.snapshot().audio_level > 0.0);
}

#[tokio::test]
async fn test_mic_busy() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let busy = MediaError::DeviceBusy {
        device: "microphone".into(),
    };
    backend.fail_requests(RequestShape::Combined, busy.clone());
    backend.fail_requests(RequestShape::AudioOnly, busy);

    let lobby = granted_lobby(&backend).await;
    let snapshot = lobby.snapshot();

    let stream = snapshot.stream.unwrap();
    assert!(stream.has_video());
    assert!(!stream.has_audio());
    assert!(snapshot.toggles.camera_enabled);
    assert!(!snapshot.toggles.mic_enabled);
    assert_eq!(snapshot.error.unwrap().kind, FaultKind::DeviceBusy);
    assert_eq!(backend.live_tracks(TrackKind::Video), 1);
}

#[tokio::test]
async fn test_mobile_waits_for_gesture() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = lobby_with(&backend, MOBILE_UA);

    assert_eq!(lobby.platform(), Platform::Mobile);
    lobby.on_context_ready().await;
    assert_eq!(backend.request_count(), 0);
    assert!(lobby.snapshot().allow_button_visible);
    assert!(lobby.session().is_none());

    assert_eq!(lobby.request_permissions().await, PermissionState::Granted);
    assert_eq!(backend.request_count(), 1);
    assert!(!lobby.snapshot().allow_button_visible);
}

#[tokio::test]
async fn test_desktop_without_auto_request_waits() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = assert_ok!(LobbyBuilder::new(backend.clone())
        .platform(Platform::Desktop)
        .auto_request_on_desktop(false)
        .build());

    assert_eq!(lobby.on_context_ready().await, PermissionState::PromptShown);
    assert!(lobby.snapshot().banner_visible);
    assert_eq!(backend.request_count(), 0);
}

// ============================================================================
// TOGGLES AND LEVEL
// ============================================================================

#[tokio::test]
async fn test_mic_off_forces_zero_level() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.set_input_level(255);
    let lobby = granted_lobby(&backend).await;
    let mut level = lobby.audio_level();

    next_frames().await;
    assert_eq!(*level.borrow_and_update(), 1.0);

    assert!(!lobby.toggle_microphone());
    assert_eq!(*level.borrow_and_update(), 0.0);
    assert!(!lobby.session().unwrap().audio_track().unwrap().is_enabled());

    next_frames().await;
    assert_eq!(*level.borrow(), 0.0);

    // Back on resumes the existing meter
    assert!(lobby.toggle_microphone());
    next_frames().await;
    assert_eq!(*level.borrow(), 1.0);
    assert_eq!(backend.analyzers_built(), 1);
}

#[tokio::test]
async fn test_toggle_without_track_only_changes_intent() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let denied = MediaError::PermissionDenied {
        operation: "camera".into(),
    };
    backend.fail_requests(RequestShape::Combined, denied.clone());
    backend.fail_requests(RequestShape::VideoOnly, denied);
    let lobby = granted_lobby(&backend).await;

    assert!(!lobby.toggles().camera_enabled);
    assert!(lobby.toggle_camera());
    assert!(lobby.toggles().camera_enabled);
    assert!(!lobby.session().unwrap().has_video());
    assert_eq!(backend.request_count(), 3);
}

#[tokio::test]
async fn test_toggle_before_grant_is_kept() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = lobby_with(&backend, MOBILE_UA);
    assert!(!lobby.toggle_camera());

    assert_eq!(lobby.request_permissions().await, PermissionState::Granted);

    let toggles = lobby.toggles();
    assert!(!toggles.camera_enabled);
    assert!(toggles.mic_enabled);
    let session = lobby.session().unwrap();
    assert!(!session.video_track().unwrap().is_enabled());
    assert!(session.audio_track().unwrap().is_enabled());
}

#[tokio::test]
async fn test_partial_grant_keeps_camera_off() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let busy = MediaError::DeviceBusy {
        device: "microphone".into(),
    };
    backend.fail_requests(RequestShape::Combined, busy.clone());
    backend.fail_requests(RequestShape::AudioOnly, busy);
    let lobby = lobby_with(&backend, MOBILE_UA);
    lobby.toggle_camera();

    assert_eq!(lobby.request_permissions().await, PermissionState::Granted);

    let toggles = lobby.toggles();
    assert!(!toggles.camera_enabled);
    assert!(!toggles.mic_enabled);
    let video = lobby.session().unwrap().video_track().cloned().unwrap();
    assert!(!video.is_enabled());
}

#[tokio::test]
async fn test_camera_toggle_disables_track() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;

    assert!(!lobby.toggle_camera());
    let session = lobby.session().unwrap();
    let video = session.video_track().unwrap();
    assert!(!video.is_enabled());
    assert!(video.is_live());
}

// ============================================================================
// SWITCHING
// ============================================================================

#[tokio::test]
async fn test_select_camera_switches_preview() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Camera"));
    let lobby = granted_lobby(&backend).await;
    let before = lobby.session().unwrap();

    assert_eq!(lobby.select_camera("cam-2").await, SwitchStatus::Switched);

    assert!(!before.is_live());
    assert_eq!(
        lobby.session().unwrap().video_track().unwrap().device_id(),
        "cam-2"
    );
    assert_eq!(lobby.selections().camera.as_deref(), Some("cam-2"));
    assert_eq!(backend.live_tracks(TrackKind::Video), 1);
    assert_eq!(backend.live_tracks(TrackKind::Audio), 1);

    assert_eq!(lobby.select_camera("cam-2").await, SwitchStatus::Unchanged);
}

#[tokio::test]
async fn test_failed_switch_reverts_and_keeps_stream() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;
    let before = lobby.session().unwrap();

    assert_eq!(lobby.select_camera("cam-404").await, SwitchStatus::Reverted);

    let snapshot = lobby.snapshot();
    assert_eq!(
        snapshot.selections.camera.as_deref(),
        Some(snapshot.devices.cameras[0].id.as_str())
    );
    assert!(before.is_live());
    assert_eq!(snapshot.stream.unwrap().id(), before.id());
    assert_eq!(
        snapshot.error.unwrap().kind,
        FaultKind::SwitchFailed {
            device: DeviceKind::Camera
        }
    );
}

#[tokio::test]
async fn test_switch_keeps_mic_level_running() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("mic-2", DeviceKind::Microphone, "Headset"));
    backend.set_input_level(128);
    let lobby = granted_lobby(&backend).await;

    assert_eq!(lobby.select_microphone("mic-2").await, SwitchStatus::Switched);
    next_frames().await;

    assert_eq!(backend.analyzers_built(), 2);
    assert_eq!(backend.analyzers_open(), 1);
    assert_eq!(lobby.snapshot().audio_level, 1.0);
}

#[tokio::test]
async fn test_rapid_reselection_is_serialized() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Camera"));
    backend.add_device(DeviceDescriptor::new("cam-3", DeviceKind::Camera, "Document Camera"));
    let lobby = granted_lobby(&backend).await;
    backend.set_request_delay(Some(Duration::from_millis(30)));

    let (first, second, third) = futures::join!(
        lobby.select_camera("cam-2"),
        lobby.select_camera("cam-3"),
        lobby.select_camera("cam-1"),
    );

    assert_eq!(first, SwitchStatus::Switched);
    assert_eq!(second, SwitchStatus::Queued);
    assert_eq!(third, SwitchStatus::Queued);

    // cam-3 was superseded before it ran
    let requested: Vec<_> = backend
        .requests()
        .iter()
        .filter_map(|r| r.video.as_ref().and_then(|v| v.device.device_id().map(str::to_string)))
        .collect();
    assert!(!requested.iter().any(|id| id == "cam-3"));
    assert_eq!(backend.request_count(), 3);

    assert_eq!(backend.live_tracks(TrackKind::Video), 1);
    assert_eq!(
        lobby.session().unwrap().video_track().unwrap().device_id(),
        "cam-1"
    );
    assert_eq!(lobby.selections().camera.as_deref(), Some("cam-1"));
}

#[tokio::test]
async fn test_selection_sequence_never_overlaps() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Camera"));
    backend.add_device(DeviceDescriptor::new("mic-2", DeviceKind::Microphone, "Headset"));
    let lobby = granted_lobby(&backend).await;

    for step in ["cam-2", "mic-2", "cam-404", "cam-1", "mic-1", "mic-404"] {
        if step.starts_with("cam") {
            lobby.select_camera(step).await;
        } else {
            lobby.select_microphone(step).await;
        }
        assert!(backend.live_tracks(TrackKind::Video) <= 1);
        assert!(backend.live_tracks(TrackKind::Audio) <= 1);
        assert!(lobby.session().unwrap().is_live());
    }
}

#[tokio::test]
async fn test_selection_before_grant_is_preferred() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Camera"));
    let lobby = lobby_with(&backend, MOBILE_UA);

    assert_eq!(lobby.select_camera("cam-2").await, SwitchStatus::Recorded);
    lobby.request_permissions().await;

    assert_eq!(
        lobby.session().unwrap().video_track().unwrap().device_id(),
        "cam-2"
    );
    assert_eq!(lobby.selections().camera.as_deref(), Some("cam-2"));
}

#[tokio::test]
async fn test_speaker_selection_does_not_reacquire() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;
    let requests = backend.request_count();

    lobby.select_speaker("spk-1");

    assert_eq!(lobby.selections().speaker.as_deref(), Some("spk-1"));
    assert_eq!(backend.request_count(), requests);
}

// ============================================================================
// PERMISSIONS AND ERRORS
// ============================================================================

#[tokio::test]
async fn test_denied_then_retry() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let denied = MediaError::PermissionDenied {
        operation: "getUserMedia".into(),
    };
    for shape in [
        RequestShape::Combined,
        RequestShape::VideoOnly,
        RequestShape::AudioOnly,
    ] {
        backend.fail_requests(shape, denied.clone());
    }
    let lobby = lobby_with(&backend, DESKTOP_UA);

    assert_eq!(lobby.on_context_ready().await, PermissionState::Denied);
    let snapshot = lobby.snapshot();
    assert_eq!(snapshot.error.unwrap().kind, FaultKind::AccessDenied);
    // Intent survives the denial; nothing can be published though
    assert!(snapshot.toggles.camera_enabled);
    assert!(snapshot.toggles.mic_enabled);
    let options = lobby.join_options();
    assert!(!options.camera_enabled);
    assert!(!options.mic_enabled);
    assert!(snapshot.stream.is_none());
    assert!(snapshot.devices.is_empty());

    for shape in [
        RequestShape::Combined,
        RequestShape::VideoOnly,
        RequestShape::AudioOnly,
    ] {
        backend.clear_request_failure(shape);
    }
    assert_eq!(lobby.retry().await, PermissionState::Granted);
    assert!(lobby.error().is_none());
    assert!(lobby.toggles().camera_enabled);
}

#[tokio::test]
async fn test_abandoned_request_can_be_retried() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.set_request_delay(Some(Duration::from_millis(50)));
    let lobby = lobby_with(&backend, MOBILE_UA);
    lobby.on_context_ready().await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), lobby.request_permissions()).await;
    assert!(abandoned.is_err());
    assert_eq!(lobby.permission_state(), PermissionState::PromptShown);
    assert!(lobby.snapshot().allow_button_visible);
    assert_eq!(backend.total_live_tracks(), 0);

    backend.set_request_delay(None);
    assert_eq!(lobby.retry().await, PermissionState::Granted);
    assert_eq!(backend.request_count(), 2);
    assert_eq!(backend.total_live_tracks(), 2);
}

#[tokio::test]
async fn test_failed_retry_keeps_live_preview() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;
    let before = lobby.session().unwrap();

    let busy = MediaError::DeviceBusy {
        device: "camera".into(),
    };
    for shape in [
        RequestShape::Combined,
        RequestShape::VideoOnly,
        RequestShape::AudioOnly,
    ] {
        backend.fail_requests(shape, busy.clone());
    }
    assert_eq!(lobby.retry().await, PermissionState::Granted);

    let snapshot = lobby.snapshot();
    assert_eq!(snapshot.stream.as_ref().map(|s| s.id()), Some(before.id()));
    assert!(snapshot.toggles.camera_enabled);
    assert!(snapshot.toggles.mic_enabled);
    assert!(before.video_track().unwrap().is_enabled());
    assert!(before.audio_track().unwrap().is_enabled());
    assert_eq!(snapshot.error.unwrap().kind, FaultKind::DeviceBusy);
    assert_eq!(backend.total_live_tracks(), 2);
    assert_eq!(backend.analyzers_open(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_do_not_overlap() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.set_request_delay(Some(Duration::from_millis(20)));
    let lobby = lobby_with(&backend, MOBILE_UA);

    let (first, second) = futures::join!(lobby.request_permissions(), lobby.request_permissions());

    assert_eq!(first, PermissionState::Granted);
    assert_eq!(second, PermissionState::Requesting);
    assert_eq!(backend.request_count(), 1);
    assert_eq!(backend.total_live_tracks(), 2);
}

#[tokio::test]
async fn test_dismiss_hides_banner() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = assert_ok!(LobbyBuilder::new(backend.clone())
        .auto_request_on_desktop(false)
        .build());
    let mut events = lobby.subscribe();

    lobby.on_context_ready().await;
    lobby.dismiss_prompt();

    let snapshot = lobby.snapshot();
    assert!(!snapshot.banner_visible);
    assert_eq!(snapshot.permission, PermissionState::Unrequested);

    let kinds: Vec<_> = events.drain().iter().map(|e| e.event_type()).collect();
    assert_eq!(
        kinds,
        vec![
            "permission_changed",
            "prompt_visibility_changed",
            "permission_changed",
            "prompt_visibility_changed",
        ]
    );

    assert_eq!(lobby.request_permissions().await, PermissionState::Granted);
}

#[tokio::test]
async fn test_refresh_requires_grant() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = lobby_with(&backend, MOBILE_UA);
    assert_err!(lobby.refresh_devices().await);

    lobby.request_permissions().await;
    backend.add_device(DeviceDescriptor::new("cam-2", DeviceKind::Camera, "USB Camera"));
    backend.remove_device("mic-1");

    let devices = assert_ok!(lobby.refresh_devices().await);
    assert_eq!(devices.cameras.len(), 2);
    assert!(devices.microphones.is_empty());
    assert_eq!(lobby.selections().microphone, None);
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    let lobby = granted_lobby(&backend).await;
    let mut events = lobby.subscribe();

    assert_eq!(lobby.cleanup(), 2);
    assert_eq!(lobby.cleanup(), 0);

    assert_eq!(backend.total_live_tracks(), 0);
    assert_eq!(backend.analyzers_open(), 0);
    assert!(lobby.session().is_none());
    assert!(lobby.is_closed());
    assert_eq!(lobby.snapshot().audio_level, 0.0);

    let cleaned: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, LobbyEvent::CleanedUp { .. }))
        .collect();
    assert_eq!(cleaned, vec![LobbyEvent::CleanedUp { tracks_stopped: 2 }]);

    assert_eq!(lobby.select_camera("cam-1").await, SwitchStatus::Ignored);
    assert_eq!(backend.total_live_tracks(), 0);
}

#[tokio::test]
async fn test_cleanup_during_acquisition_releases_tracks() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    backend.set_request_delay(Some(Duration::from_millis(40)));
    let lobby = lobby_with(&backend, MOBILE_UA);

    let (_, stopped) = futures::join!(lobby.request_permissions(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        lobby.cleanup()
    });

    assert_eq!(stopped, 0);
    assert_eq!(backend.total_live_tracks(), 0);
    assert!(lobby.session().is_none());
}

#[tokio::test]
async fn test_drop_releases_everything() {
    let backend = Arc::new(MockMediaDevices::with_default_hardware());
    {
        let _lobby = granted_lobby(&backend).await;
        assert_eq!(backend.total_live_tracks(), 2);
        assert_eq!(backend.analyzers_open(), 1);
    }
    assert_eq!(backend.total_live_tracks(), 0);
    assert_eq!(backend.analyzers_open(), 0);
}
