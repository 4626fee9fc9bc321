//! Device enumeration and selection
//!
//! Enumeration is only meaningful after a successful acquisition: before
//! the first grant the platform withholds labels and may hide devices.

use crate::backend::MediaDevices;
use crate::error::MediaResult;
use crate::tracks::{DeviceDescriptor, DeviceKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Enumerated devices grouped by kind, in platform order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceList {
    pub cameras: Vec<DeviceDescriptor>,
    pub microphones: Vec<DeviceDescriptor>,
    pub speakers: Vec<DeviceDescriptor>,
}

impl DeviceList {
    /// Group a flat platform listing
    pub fn from_descriptors(devices: Vec<DeviceDescriptor>) -> Self {
        let mut list = Self::default();
        for device in devices {
            match device.kind {
                DeviceKind::Camera => list.cameras.push(device),
                DeviceKind::Microphone => list.microphones.push(device),
                DeviceKind::Speaker => list.speakers.push(device),
            }
        }
        list
    }

    /// Devices of one kind
    pub fn of_kind(&self, kind: DeviceKind) -> &[DeviceDescriptor] {
        match kind {
            DeviceKind::Camera => &self.cameras,
            DeviceKind::Microphone => &self.microphones,
            DeviceKind::Speaker => &self.speakers,
        }
    }

    /// First device of one kind
    pub fn first_of(&self, kind: DeviceKind) -> Option<&DeviceDescriptor> {
        self.of_kind(kind).first()
    }

    pub fn contains(&self, kind: DeviceKind, id: &str) -> bool {
        self.of_kind(kind).iter().any(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.cameras.len() + self.microphones.len() + self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selected device id per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelections {
    pub camera: Option<String>,
    pub microphone: Option<String>,
    pub speaker: Option<String>,
}

impl DeviceSelections {
    /// Selected id for one kind
    pub fn get(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::Camera => self.camera.as_deref(),
            DeviceKind::Microphone => self.microphone.as_deref(),
            DeviceKind::Speaker => self.speaker.as_deref(),
        }
    }

    /// Replace the selection for one kind, returning the previous one
    pub fn set(&mut self, kind: DeviceKind, id: Option<String>) -> Option<String> {
        let slot = match kind {
            DeviceKind::Camera => &mut self.camera,
            DeviceKind::Microphone => &mut self.microphone,
            DeviceKind::Speaker => &mut self.speaker,
        };
        std::mem::replace(slot, id)
    }
}

#[derive(Debug, Default)]
struct EnumeratorState {
    devices: DeviceList,
    selections: DeviceSelections,
    enumerated: bool,
}

const ALL_KINDS: [DeviceKind; 3] = [DeviceKind::Camera, DeviceKind::Microphone, DeviceKind::Speaker];

/// Holds the device lists and the user's selections
pub struct DeviceEnumerator {
    backend: Arc<dyn MediaDevices>,
    state: Mutex<EnumeratorState>,
}

impl std::fmt::Debug for DeviceEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEnumerator")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn MediaDevices>) -> Self {
        Self {
            backend,
            state: Mutex::new(EnumeratorState::default()),
        }
    }

    /// Query the platform and replace the stored lists
    ///
    /// Selections are left untouched; see [`reconcile`](Self::reconcile).
    pub async fn enumerate(&self) -> MediaResult<DeviceList> {
        let list = DeviceList::from_descriptors(self.backend.list_devices().await?);
        info!(
            "📋 Enumerated {} cameras, {} microphones, {} speakers",
            list.cameras.len(),
            list.microphones.len(),
            list.speakers.len()
        );

        let mut state = self.state.lock();
        state.devices = list.clone();
        state.enumerated = true;
        Ok(list)
    }

    /// Select the first device of each kind that has no selection yet
    ///
    /// Returns the kinds whose selection changed.
    pub fn select_defaults(&self) -> Vec<DeviceKind> {
        let mut state = self.state.lock();
        let mut changed = Vec::new();
        for kind in ALL_KINDS {
            if state.selections.get(kind).is_some() {
                continue;
            }
            if let Some(first) = state.devices.first_of(kind).map(|d| d.id.clone()) {
                debug!("Default {} selection: {}", kind.display_name(), first);
                state.selections.set(kind, Some(first));
                changed.push(kind);
            }
        }
        changed
    }

    /// Record a selection, returning the previous one
    pub fn select(&self, kind: DeviceKind, id: &str) -> Option<String> {
        self.state.lock().selections.set(kind, Some(id.to_string()))
    }

    /// First enumerated device of one kind
    pub fn first_of(&self, kind: DeviceKind) -> Option<DeviceDescriptor> {
        self.state.lock().devices.first_of(kind).cloned()
    }

    /// Point the selection back at the first device of its kind
    ///
    /// Returns the new selection, `None` when no device of the kind is left.
    pub fn revert_to_first(&self, kind: DeviceKind) -> Option<String> {
        let mut state = self.state.lock();
        let first = state.devices.first_of(kind).map(|d| d.id.clone());
        state.selections.set(kind, first.clone());
        info!(
            "↩️ Reverted {} selection to {}",
            kind.display_name(),
            first.as_deref().unwrap_or("none")
        );
        first
    }

    /// Repair selections after a re-enumeration
    ///
    /// A selection whose device vanished falls back to the first device of
    /// its kind, or is cleared when none is left. Returns the changed kinds.
    pub fn reconcile(&self) -> Vec<DeviceKind> {
        let mut state = self.state.lock();
        let mut changed = Vec::new();
        for kind in ALL_KINDS {
            let Some(selected) = state.selections.get(kind).map(str::to_string) else {
                continue;
            };
            if state.devices.contains(kind, &selected) {
                continue;
            }
            let fallback = state.devices.first_of(kind).map(|d| d.id.clone());
            debug!(
                "Selected {} {} vanished, falling back to {:?}",
                kind.display_name(),
                selected,
                fallback
            );
            state.selections.set(kind, fallback);
            changed.push(kind);
        }
        changed
    }

    /// Whether the platform has exposed device labels
    pub fn has_labels(&self) -> bool {
        let state = self.state.lock();
        ALL_KINDS
            .iter()
            .flat_map(|kind| state.devices.of_kind(*kind))
            .any(|d| !d.label.is_empty())
    }

    pub fn is_enumerated(&self) -> bool {
        self.state.lock().enumerated
    }

    pub fn devices(&self) -> DeviceList {
        self.state.lock().devices.clone()
    }

    pub fn selections(&self) -> DeviceSelections {
        self.state.lock().selections.clone()
    }

    /// Selected id for one kind
    pub fn selected(&self, kind: DeviceKind) -> Option<String> {
        self.state.lock().selections.get(kind).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMediaDevices;

    fn enumerator_with(devices: Vec<DeviceDescriptor>) -> (Arc<MockMediaDevices>, DeviceEnumerator) {
        let backend = Arc::new(MockMediaDevices::with_devices(devices));
        let enumerator = DeviceEnumerator::new(backend.clone());
        (backend, enumerator)
    }

    fn two_cameras() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor::new("cam-1", DeviceKind::Camera, "Front"),
            DeviceDescriptor::new("cam-2", DeviceKind::Camera, "Back"),
            DeviceDescriptor::new("mic-1", DeviceKind::Microphone, "Mic"),
        ]
    }

    #[test]
    fn test_selections_get_set() {
        let mut selections = DeviceSelections::default();
        assert_eq!(selections.set(DeviceKind::Camera, Some("a".into())), None);
        assert_eq!(selections.get(DeviceKind::Camera), Some("a"));
        assert_eq!(
            selections.set(DeviceKind::Camera, None),
            Some("a".to_string())
        );
        assert_eq!(selections.get(DeviceKind::Speaker), None);
    }

    #[tokio::test]
    async fn test_defaults_never_override_choice() {
        let (_backend, enumerator) = enumerator_with(two_cameras());
        enumerator.enumerate().await.unwrap();
        enumerator.select(DeviceKind::Camera, "cam-2");

        let changed = enumerator.select_defaults();

        assert_eq!(changed, vec![DeviceKind::Microphone]);
        assert_eq!(enumerator.selected(DeviceKind::Camera).as_deref(), Some("cam-2"));
        assert_eq!(enumerator.selected(DeviceKind::Microphone).as_deref(), Some("mic-1"));
        assert_eq!(enumerator.selected(DeviceKind::Speaker), None);
    }

    #[tokio::test]
    async fn test_reconcile_after_unplug() {
        let (backend, enumerator) = enumerator_with(two_cameras());
        enumerator.enumerate().await.unwrap();
        enumerator.select(DeviceKind::Camera, "cam-2");
        enumerator.select(DeviceKind::Microphone, "mic-1");

        backend.remove_device("cam-2");
        backend.remove_device("mic-1");
        enumerator.enumerate().await.unwrap();
        let mut changed = enumerator.reconcile();
        changed.sort_by_key(|k| k.display_name());

        assert_eq!(changed, vec![DeviceKind::Camera, DeviceKind::Microphone]);
        assert_eq!(enumerator.selected(DeviceKind::Camera).as_deref(), Some("cam-1"));
        assert_eq!(enumerator.selected(DeviceKind::Microphone), None);
    }

    #[tokio::test]
    async fn test_labels_hidden_before_grant() {
        let (_backend, enumerator) = enumerator_with(two_cameras());
        enumerator.enumerate().await.unwrap();
        assert!(enumerator.is_enumerated());
        assert!(!enumerator.has_labels());
    }
}
