//! Lobby session lifecycle
//!
//! [`SessionLifecycle`] owns everything the lobby holds: the permission
//! gate, device lists and selections, toggle intent, the live preview
//! session and the level meter. The UI talks only to this type.
//!
//! Acquisition and switching share one operation guard. A second
//! acquisition while one is in flight is ignored; a switch while busy is
//! queued (latest request per device kind wins) and run by whichever task
//! holds the guard before it releases it. State sits behind a mutex that is
//! never held across an await point.

use crate::config::LobbyConfig;
use crate::event::{EventStream, LobbyEvent};
use crate::permission::{PermissionGate, PermissionState, Platform, ReadyAction};
use meetlobby_core::{JoinOptions, LobbyError};
use meetlobby_media::{
    AudioLevelAnalyzer, DeviceEnumerator, DeviceFault, DeviceKind, DeviceList, DeviceSelections,
    DeviceSwitcher, FaultKind, MediaDevices, MediaSession, MediaStreamAcquirer, SwitchOutcome,
    SwitchRequest,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Camera and microphone intent
///
/// Independent of whether a track exists: toggling without a track only
/// changes intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleState {
    pub camera_enabled: bool,
    pub mic_enabled: bool,
}

impl Default for ToggleState {
    fn default() -> Self {
        Self {
            camera_enabled: true,
            mic_enabled: true,
        }
    }
}

/// Everything the lobby UI renders
#[derive(Debug, Clone)]
pub struct LobbySnapshot {
    pub devices: DeviceList,
    pub selections: DeviceSelections,
    pub toggles: ToggleState,
    pub stream: Option<MediaSession>,
    pub permission: PermissionState,
    pub banner_visible: bool,
    pub allow_button_visible: bool,
    pub error: Option<DeviceFault>,
    pub audio_level: f32,
}

/// Result of a device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStatus {
    /// The preview now runs on the selected device
    Switched,
    /// The device was already live; nothing re-acquired
    Unchanged,
    /// No preview yet; the selection is used by the next acquisition
    Recorded,
    /// Another operation is in flight; the request runs after it
    Queued,
    /// The device is gone; selection reverted to the first of its kind
    Reverted,
    /// The switch failed; the previous preview stays
    Kept,
    /// The lobby was cleaned up
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GateView {
    state: PermissionState,
    banner_visible: bool,
    allow_button_visible: bool,
}

impl GateView {
    fn of(gate: &PermissionGate) -> Self {
        Self {
            state: gate.state(),
            banner_visible: gate.banner_visible(),
            allow_button_visible: gate.allow_button_visible(),
        }
    }
}

struct LobbyState {
    gate: PermissionGate,
    toggles: ToggleState,
    session: Option<MediaSession>,
    analyzer: AudioLevelAnalyzer,
    error: Option<DeviceFault>,
    closed: bool,
}

impl LobbyState {
    /// Point the level meter at the current audio track, running only
    /// while the microphone is enabled
    fn sync_analyzer(&mut self, backend: &dyn MediaDevices) {
        let session = match &self.session {
            Some(session) if session.has_audio() => session,
            _ => {
                self.analyzer.detach();
                return;
            }
        };
        let track_id = session.audio_track().map(|t| t.id());
        let attached = self.analyzer.attached_track_id() == track_id;

        let result = match (attached, self.toggles.mic_enabled) {
            (true, true) => self.analyzer.start().map(|_| ()),
            (true, false) => {
                self.analyzer.stop();
                Ok(())
            }
            (false, true) => self.analyzer.attach(backend, session),
            (false, false) => {
                self.analyzer.detach();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Level meter unavailable: {}", e);
        }
    }

    /// Replace the live session, stopping the previous one first
    fn adopt(&mut self, next: MediaSession, backend: &dyn MediaDevices) -> usize {
        let stopped = match self.session.take() {
            Some(previous) if previous.id() != next.id() => previous.stop_all(),
            _ => 0,
        };
        next.apply_toggles(self.toggles.camera_enabled, self.toggles.mic_enabled);
        self.session = Some(next);
        self.sync_analyzer(backend);
        stopped
    }
}

#[derive(Debug, Default)]
struct OperationGuard {
    busy: bool,
    pending: VecDeque<SwitchRequest>,
}

/// Held while an acquisition or switch runs
struct OperationPermit<'a> {
    lobby: &'a SessionLifecycle,
    /// Gate state to go back to if an in-flight request is abandoned
    restore: Option<PermissionState>,
    armed: bool,
}

impl Drop for OperationPermit<'_> {
    fn drop(&mut self) {
        // Only reached armed when the operation future was cancelled
        if !self.armed {
            return;
        }
        {
            let mut guard = self.lobby.guard.lock();
            guard.busy = false;
            guard.pending.clear();
        }
        if let Some(previous) = self.restore.take() {
            let mut state = self.lobby.state.lock();
            let before = GateView::of(&state.gate);
            state.gate.abort_request(previous);
            self.lobby.emit_gate_changes(before, &state.gate);
        }
    }
}

/// Pre-call lobby state machine
pub struct SessionLifecycle {
    config: LobbyConfig,
    backend: Arc<dyn MediaDevices>,
    acquirer: MediaStreamAcquirer,
    enumerator: DeviceEnumerator,
    switcher: DeviceSwitcher,
    state: Mutex<LobbyState>,
    guard: Mutex<OperationGuard>,
    events: broadcast::Sender<LobbyEvent>,
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionLifecycle")
            .field("platform", &state.gate.platform())
            .field("permission", &state.gate.state())
            .field("toggles", &state.toggles)
            .field("session", &state.session.as_ref().map(|s| s.id()))
            .field("error", &state.error)
            .field("closed", &state.closed)
            .finish()
    }
}

impl SessionLifecycle {
    /// Create a lobby on top of a media backend
    pub fn new(backend: Arc<dyn MediaDevices>, config: LobbyConfig) -> Result<Self, LobbyError> {
        config.validate()?;

        let acquirer = MediaStreamAcquirer::new(backend.clone(), config.video_profile);
        let (events, _) = broadcast::channel(config.event_capacity);
        let state = LobbyState {
            gate: PermissionGate::new(config.platform, config.auto_request_on_desktop),
            toggles: ToggleState::default(),
            session: None,
            analyzer: AudioLevelAnalyzer::new(config.analyzer.clone()),
            error: None,
            closed: false,
        };

        info!("🚪 Lobby created ({:?})", config.platform);
        Ok(Self {
            enumerator: DeviceEnumerator::new(backend.clone()),
            switcher: DeviceSwitcher::new(acquirer.clone()),
            acquirer,
            backend,
            config,
            state: Mutex::new(state),
            guard: Mutex::new(OperationGuard::default()),
            events,
        })
    }

    // ========================================================================
    // PERMISSION
    // ========================================================================

    /// The meeting context is ready
    ///
    /// On desktop this shows the banner and, unless disabled, acquires
    /// straight away. On mobile it only shows the banner and the allow
    /// button.
    pub async fn on_context_ready(&self) -> PermissionState {
        let action = {
            let mut state = self.state.lock();
            if state.closed {
                return state.gate.state();
            }
            let before = GateView::of(&state.gate);
            let action = state.gate.on_context_ready();
            self.emit_gate_changes(before, &state.gate);
            action
        };

        match action {
            ReadyAction::Acquire => self.acquire().await,
            ReadyAction::Wait => self.permission_state(),
        }
    }

    /// Explicit request from a user gesture
    pub async fn request_permissions(&self) -> PermissionState {
        self.acquire().await
    }

    /// Clear the current error and acquire again
    pub async fn retry(&self) -> PermissionState {
        self.clear_error();
        self.acquire().await
    }

    /// Hide the permission banner for the rest of the session
    pub fn dismiss_prompt(&self) {
        let mut state = self.state.lock();
        let before = GateView::of(&state.gate);
        state.gate.dismiss();
        self.emit_gate_changes(before, &state.gate);
    }

    async fn acquire(&self) -> PermissionState {
        let Some(mut permit) = self.try_begin() else {
            debug!("Acquisition already in flight, ignoring request");
            return self.permission_state();
        };

        let preferences = {
            let mut state = self.state.lock();
            let before = GateView::of(&state.gate);
            if state.closed {
                None
            } else if let Err(e) = state.gate.begin_request() {
                warn!("Cannot start acquisition: {}", e);
                None
            } else {
                self.emit_gate_changes(before, &state.gate);
                Some((
                    self.enumerator.selected(DeviceKind::Camera),
                    self.enumerator.selected(DeviceKind::Microphone),
                    before.state,
                ))
            }
        };
        let Some((camera, microphone, previous)) = preferences else {
            self.release(&mut permit).await;
            return self.permission_state();
        };
        permit.restore = Some(previous);

        let result = self
            .acquirer
            .acquire(camera.as_deref(), microphone.as_deref())
            .await;
        permit.restore = None;

        match result {
            Ok(acquisition) => {
                let adopted = {
                    let mut state = self.state.lock();
                    if state.closed {
                        let stopped = acquisition.session.stop_all();
                        state.gate.abort_request(previous);
                        debug!("Lobby closed during acquisition, stopped {} tracks", stopped);
                        false
                    } else {
                        let before = GateView::of(&state.gate);
                        state.gate.complete(true);
                        // Only a modality that failed to acquire turns its intent off
                        let prior = state.toggles;
                        state.toggles = ToggleState {
                            camera_enabled: prior.camera_enabled && acquisition.camera_enabled,
                            mic_enabled: prior.mic_enabled && acquisition.mic_enabled,
                        };
                        let session_id = acquisition.session.id();
                        state.adopt(acquisition.session.clone(), self.backend.as_ref());
                        self.emit_gate_changes(before, &state.gate);
                        self.emit_toggles(state.toggles);
                        self.emit(LobbyEvent::StreamChanged {
                            session_id: Some(session_id),
                        });
                        self.set_error(&mut state, acquisition.fault());
                        true
                    }
                };
                if adopted {
                    self.enumerate_after_grant().await;
                }
            }
            Err(failure) => {
                let mut state = self.state.lock();
                if state.closed {
                    state.gate.abort_request(previous);
                } else {
                    // A failed re-acquisition leaves the running preview and intent alone
                    let keeps_preview = state.session.as_ref().is_some_and(|s| s.is_live());
                    let before = GateView::of(&state.gate);
                    state.gate.complete(keeps_preview);
                    self.emit_gate_changes(before, &state.gate);
                    self.set_error(&mut state, Some(DeviceFault::from(failure.classification)));
                }
            }
        }

        self.release(&mut permit).await;
        self.permission_state()
    }

    async fn enumerate_after_grant(&self) {
        let devices = match self.enumerator.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                return;
            }
        };
        self.emit(LobbyEvent::DevicesChanged { devices });

        let mut changed = self.enumerator.select_defaults();
        changed.extend(self.enumerator.reconcile());
        self.emit_selections(&changed);
    }

    // ========================================================================
    // TOGGLES
    // ========================================================================

    /// Flip camera intent; returns the new value
    pub fn toggle_camera(&self) -> bool {
        let mut state = self.state.lock();
        state.toggles.camera_enabled = !state.toggles.camera_enabled;
        let enabled = state.toggles.camera_enabled;
        if let Some(video) = state.session.as_ref().and_then(|s| s.video_track()) {
            video.set_enabled(enabled);
        }
        debug!("Camera {}", if enabled { "on" } else { "off" });
        self.emit(LobbyEvent::ToggleChanged {
            kind: DeviceKind::Camera,
            enabled,
        });
        enabled
    }

    /// Flip microphone intent; returns the new value
    ///
    /// Turning the microphone off drives the published level to 0 at once;
    /// turning it back on resumes the existing level meter.
    pub fn toggle_microphone(&self) -> bool {
        let mut state = self.state.lock();
        state.toggles.mic_enabled = !state.toggles.mic_enabled;
        let enabled = state.toggles.mic_enabled;
        if let Some(audio) = state.session.as_ref().and_then(|s| s.audio_track()) {
            audio.set_enabled(enabled);
        }
        state.sync_analyzer(self.backend.as_ref());
        debug!("Microphone {}", if enabled { "on" } else { "off" });
        self.emit(LobbyEvent::ToggleChanged {
            kind: DeviceKind::Microphone,
            enabled,
        });
        enabled
    }

    // ========================================================================
    // DEVICE SELECTION
    // ========================================================================

    /// Switch the preview to another camera
    pub async fn select_camera(&self, device_id: &str) -> SwitchStatus {
        self.select(SwitchRequest::Camera(device_id.to_string()))
            .await
    }

    /// Switch the preview to another microphone
    pub async fn select_microphone(&self, device_id: &str) -> SwitchStatus {
        self.select(SwitchRequest::Microphone(device_id.to_string()))
            .await
    }

    /// Record the speaker choice; nothing is re-acquired
    pub fn select_speaker(&self, device_id: &str) {
        self.enumerator.select(DeviceKind::Speaker, device_id);
        self.emit_selections(&[DeviceKind::Speaker]);
    }

    async fn select(&self, request: SwitchRequest) -> SwitchStatus {
        let mut permit = {
            let mut guard = self.guard.lock();
            if guard.busy {
                guard.pending.retain(|queued| queued.kind() != request.kind());
                debug!("Operation in flight, queueing {:?}", request);
                guard.pending.push_back(request);
                return SwitchStatus::Queued;
            }
            guard.busy = true;
            OperationPermit {
                lobby: self,
                restore: None,
                armed: true,
            }
        };

        let status = self.perform_switch(request).await;
        self.release(&mut permit).await;
        status
    }

    async fn perform_switch(&self, request: SwitchRequest) -> SwitchStatus {
        let kind = request.kind();
        let current = {
            let state = self.state.lock();
            if state.closed {
                return SwitchStatus::Ignored;
            }
            state.session.clone()
        };

        let Some(current) = current else {
            self.enumerator.select(kind, request.device_id());
            self.emit_selections(&[kind]);
            return SwitchStatus::Recorded;
        };

        if DeviceSwitcher::is_noop(&request, Some(&current)) {
            if self.enumerator.select(kind, request.device_id()).as_deref()
                != Some(request.device_id())
            {
                self.emit_selections(&[kind]);
            }
            return SwitchStatus::Unchanged;
        }

        let outcome = self
            .switcher
            .switch(&request, &self.enumerator, Some(&current))
            .await;

        let mut state = self.state.lock();
        match outcome {
            SwitchOutcome::Acquired(next) => {
                if state.closed {
                    next.stop_all();
                    return SwitchStatus::Ignored;
                }
                // Commit against the latest session, not the one captured above
                let mut slot = state.session.take();
                DeviceSwitcher::commit(&request, &self.enumerator, &mut slot, next);
                if let Some(session) = &slot {
                    session.apply_toggles(state.toggles.camera_enabled, state.toggles.mic_enabled);
                }
                state.session = slot;
                state.sync_analyzer(self.backend.as_ref());

                self.emit(LobbyEvent::StreamChanged {
                    session_id: state.session.as_ref().map(|s| s.id()),
                });
                self.emit_selections(&[kind]);
                let resolved = state
                    .error
                    .as_ref()
                    .is_some_and(|fault| fault.kind == FaultKind::SwitchFailed { device: kind });
                if resolved {
                    self.set_error(&mut state, None);
                }
                SwitchStatus::Switched
            }
            SwitchOutcome::Reverted { fault, .. } => {
                self.emit_selections(&[kind]);
                self.set_error(&mut state, Some(fault));
                SwitchStatus::Reverted
            }
            SwitchOutcome::Kept { fault, .. } => {
                self.set_error(&mut state, Some(fault));
                SwitchStatus::Kept
            }
        }
    }

    /// Re-enumerate after a device change and repair stale selections
    pub async fn refresh_devices(&self) -> Result<DeviceList, LobbyError> {
        let permission = self.permission_state();
        if permission != PermissionState::Granted {
            return Err(LobbyError::InvalidState {
                expected: PermissionState::Granted.to_string(),
                actual: permission.to_string(),
            });
        }

        let devices = self.enumerator.enumerate().await?;
        self.emit(LobbyEvent::DevicesChanged {
            devices: devices.clone(),
        });
        let changed = self.enumerator.reconcile();
        self.emit_selections(&changed);
        Ok(devices)
    }

    // ========================================================================
    // ERRORS AND TEARDOWN
    // ========================================================================

    /// Clear the current error
    pub fn clear_error(&self) {
        let mut state = self.state.lock();
        self.set_error(&mut state, None);
    }

    /// Stop every track and tear down the level meter
    ///
    /// Idempotent. Returns the number of tracks that were still live.
    pub fn cleanup(&self) -> usize {
        let mut state = self.state.lock();
        state.analyzer.detach();
        let stopped = state
            .session
            .take()
            .map(|session| session.stop_all())
            .unwrap_or(0);
        self.guard.lock().pending.clear();

        let first = !state.closed;
        state.closed = true;
        if first || stopped > 0 {
            info!("🧹 Lobby cleaned up, stopped {} tracks", stopped);
            self.emit(LobbyEvent::StreamChanged { session_id: None });
            self.emit(LobbyEvent::CleanedUp {
                tracks_stopped: stopped,
            });
        }
        stopped
    }

    // ========================================================================
    // OBSERVATION
    // ========================================================================

    /// Receive lobby events
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Receive microphone level updates in `[0, 1]`
    pub fn audio_level(&self) -> watch::Receiver<f32> {
        self.state.lock().analyzer.subscribe()
    }

    /// Device choices to carry into the meeting
    ///
    /// A device is published only when it is both wanted and was acquired.
    pub fn join_options(&self) -> JoinOptions {
        let selections = self.enumerator.selections();
        let state = self.state.lock();
        let session = state.session.as_ref();
        JoinOptions {
            camera_enabled: state.toggles.camera_enabled && session.is_some_and(|s| s.has_video()),
            mic_enabled: state.toggles.mic_enabled && session.is_some_and(|s| s.has_audio()),
            camera_device_id: selections.camera,
            mic_device_id: selections.microphone,
            speaker_device_id: selections.speaker,
        }
    }

    /// Everything the UI renders
    pub fn snapshot(&self) -> LobbySnapshot {
        let devices = self.enumerator.devices();
        let selections = self.enumerator.selections();
        let state = self.state.lock();
        LobbySnapshot {
            devices,
            selections,
            toggles: state.toggles,
            stream: state.session.clone(),
            permission: state.gate.state(),
            banner_visible: state.gate.banner_visible(),
            allow_button_visible: state.gate.allow_button_visible(),
            error: state.error.clone(),
            audio_level: state.analyzer.level(),
        }
    }

    pub fn permission_state(&self) -> PermissionState {
        self.state.lock().gate.state()
    }

    pub fn platform(&self) -> Platform {
        self.config.platform
    }

    pub fn toggles(&self) -> ToggleState {
        self.state.lock().toggles
    }

    pub fn error(&self) -> Option<DeviceFault> {
        self.state.lock().error.clone()
    }

    /// Live preview session
    pub fn session(&self) -> Option<MediaSession> {
        self.state.lock().session.clone()
    }

    pub fn devices(&self) -> DeviceList {
        self.enumerator.devices()
    }

    pub fn selections(&self) -> DeviceSelections {
        self.enumerator.selections()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn try_begin(&self) -> Option<OperationPermit<'_>> {
        let mut guard = self.guard.lock();
        if guard.busy {
            return None;
        }
        guard.busy = true;
        Some(OperationPermit {
            lobby: self,
            restore: None,
            armed: true,
        })
    }

    /// Run queued switches, then release the guard
    async fn release(&self, permit: &mut OperationPermit<'_>) {
        loop {
            let next = {
                let mut guard = self.guard.lock();
                match guard.pending.pop_front() {
                    Some(request) => request,
                    None => {
                        guard.busy = false;
                        permit.armed = false;
                        return;
                    }
                }
            };
            debug!("Running queued {:?}", next);
            self.perform_switch(next).await;
        }
    }

    fn set_error(&self, state: &mut LobbyState, fault: Option<DeviceFault>) {
        if state.error == fault {
            return;
        }
        state.error = fault.clone();
        match fault {
            Some(fault) => {
                warn!("⚠️ {}", fault.message);
                self.emit(LobbyEvent::ErrorRaised { fault });
            }
            None => self.emit(LobbyEvent::ErrorCleared),
        }
    }

    fn emit_gate_changes(&self, before: GateView, gate: &PermissionGate) {
        let after = GateView::of(gate);
        if before.state != after.state {
            self.emit(LobbyEvent::PermissionChanged { state: after.state });
        }
        if before.banner_visible != after.banner_visible
            || before.allow_button_visible != after.allow_button_visible
        {
            self.emit(LobbyEvent::PromptVisibilityChanged {
                banner_visible: after.banner_visible,
                allow_button_visible: after.allow_button_visible,
            });
        }
    }

    fn emit_toggles(&self, toggles: ToggleState) {
        self.emit(LobbyEvent::ToggleChanged {
            kind: DeviceKind::Camera,
            enabled: toggles.camera_enabled,
        });
        self.emit(LobbyEvent::ToggleChanged {
            kind: DeviceKind::Microphone,
            enabled: toggles.mic_enabled,
        });
    }

    fn emit_selections(&self, kinds: &[DeviceKind]) {
        for kind in kinds {
            self.emit(LobbyEvent::SelectionChanged {
                kind: *kind,
                device_id: self.enumerator.selected(*kind),
            });
        }
    }

    fn emit(&self, event: LobbyEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for SessionLifecycle {
    fn drop(&mut self) {
        self.cleanup();
    }
}
