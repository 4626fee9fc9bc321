//! Configuration types and defaults

use crate::permission::Platform;
use meetlobby_core::LobbyError;
use meetlobby_media::{AnalyzerConfig, VideoProfile};
use serde::{Deserialize, Serialize};

/// Lobby configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Permission prompt behavior
    pub platform: Platform,
    /// Camera preview profile
    pub video_profile: VideoProfile,
    /// Microphone level meter
    pub analyzer: AnalyzerConfig,
    /// Request access as soon as the context is ready on desktop
    pub auto_request_on_desktop: bool,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Capacity of the lobby event channel
    pub event_capacity: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            video_profile: VideoProfile::LOBBY,
            analyzer: AnalyzerConfig::default(),
            auto_request_on_desktop: true,
            debug_logging: false,
            event_capacity: 64,
        }
    }
}

impl LobbyConfig {
    /// Defaults with the platform detected from a user agent
    pub fn for_user_agent(user_agent: &str) -> Self {
        Self {
            platform: Platform::from_user_agent(user_agent),
            ..Default::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, LobbyError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LobbyError::InvalidConfiguration {
                reason: format!("Failed to parse lobby config: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), LobbyError> {
        self.video_profile.validate()?;
        self.analyzer.validate()?;
        if self.event_capacity == 0 {
            return Err(LobbyError::InvalidConfiguration {
                reason: "event_capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
