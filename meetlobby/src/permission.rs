//! Permission gating for camera and microphone access
//!
//! Desktop browsers show their native dialog on the first stream request,
//! so the lobby shows an explanatory banner first and then requests on its
//! own. Mobile browsers only show the dialog from inside a user gesture, so
//! there the lobby waits for an explicit "Allow" tap.

use meetlobby_core::LobbyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Platform class, as far as permission prompts are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Permission prompts may be triggered programmatically
    #[default]
    Desktop,
    /// Permission prompts need a user gesture
    Mobile,
}

const MOBILE_UA_TOKENS: [&str; 9] = [
    "Android",
    "iPhone",
    "iPad",
    "iPod",
    "Mobile",
    "Opera Mini",
    "IEMobile",
    "webOS",
    "BlackBerry",
];

impl Platform {
    /// Classify a browser user agent string
    pub fn from_user_agent(user_agent: &str) -> Self {
        let lower = user_agent.to_ascii_lowercase();
        let mobile = MOBILE_UA_TOKENS
            .iter()
            .any(|token| lower.contains(&token.to_ascii_lowercase()));
        if mobile {
            Platform::Mobile
        } else {
            Platform::Desktop
        }
    }

    /// Whether the native prompt must come from a user gesture
    pub fn requires_user_gesture(&self) -> bool {
        matches!(self, Platform::Mobile)
    }
}

/// Where the lobby is in the permission flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    /// Nothing asked yet
    #[default]
    Unrequested,
    /// Explanatory banner shown, native dialog not yet triggered
    PromptShown,
    /// Waiting on the native dialog
    Requesting,
    /// At least one device granted
    Granted,
    /// Access refused or no device could be opened
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionState::Unrequested => "unrequested",
            PermissionState::PromptShown => "prompt_shown",
            PermissionState::Requesting => "requesting",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// What the caller should do after the meeting context became ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyAction {
    /// Start acquisition now
    Acquire,
    /// Wait for an explicit request
    Wait,
}

/// Permission state machine
///
/// `Unrequested → PromptShown → Requesting → {Granted | Denied}`
#[derive(Debug, Clone)]
pub struct PermissionGate {
    platform: Platform,
    auto_request: bool,
    state: PermissionState,
    dismissed: bool,
}

impl PermissionGate {
    pub fn new(platform: Platform, auto_request_on_desktop: bool) -> Self {
        Self {
            platform,
            auto_request: auto_request_on_desktop,
            state: PermissionState::Unrequested,
            dismissed: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    /// The meeting context is ready; decide whether to acquire now
    ///
    /// The banner is raised on every platform, but only desktop proceeds to
    /// acquisition without a gesture.
    pub fn on_context_ready(&mut self) -> ReadyAction {
        if self.state != PermissionState::Unrequested {
            debug!("Context ready with permission already {}", self.state);
            return ReadyAction::Wait;
        }
        if !self.dismissed {
            self.state = PermissionState::PromptShown;
            info!("🔔 Showing permission banner ({:?})", self.platform);
        }

        match self.platform {
            Platform::Desktop if self.auto_request => ReadyAction::Acquire,
            _ => ReadyAction::Wait,
        }
    }

    /// Enter `Requesting`; rejected while a request is already in flight
    pub fn begin_request(&mut self) -> Result<(), LobbyError> {
        if self.state == PermissionState::Requesting {
            return Err(LobbyError::InvalidState {
                expected: "not requesting".to_string(),
                actual: self.state.to_string(),
            });
        }
        self.state = PermissionState::Requesting;
        Ok(())
    }

    /// Leave `Requesting` without an outcome, going back to `previous`
    pub fn abort_request(&mut self, previous: PermissionState) {
        if self.state == PermissionState::Requesting {
            self.state = previous;
            debug!("Permission request abandoned, back to {}", self.state);
        }
    }

    /// Record the outcome of a request
    pub fn complete(&mut self, granted: bool) {
        self.state = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        info!("🔐 Permission {}", self.state);
    }

    /// Hide the banner for the rest of the session
    pub fn dismiss(&mut self) {
        self.dismissed = true;
        if self.state == PermissionState::PromptShown {
            self.state = PermissionState::Unrequested;
        }
        debug!("Permission banner dismissed");
    }

    /// Whether the explanatory banner should be rendered
    pub fn banner_visible(&self) -> bool {
        !self.dismissed
            && matches!(
                self.state,
                PermissionState::PromptShown | PermissionState::Requesting
            )
    }

    /// Whether the "Allow camera & microphone" button should be rendered
    pub fn allow_button_visible(&self) -> bool {
        self.platform.requires_user_gesture()
            && matches!(
                self.state,
                PermissionState::Unrequested
                    | PermissionState::PromptShown
                    | PermissionState::Denied
            )
    }

    pub fn requires_user_gesture(&self) -> bool {
        self.platform.requires_user_gesture()
    }
}
