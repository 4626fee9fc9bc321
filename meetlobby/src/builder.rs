//! Lobby construction

use crate::config::LobbyConfig;
use crate::logging;
use crate::permission::Platform;
use crate::session::SessionLifecycle;
use meetlobby_core::LobbyError;
use meetlobby_media::{AnalyzerConfig, MediaDevices, VideoProfile};
use std::sync::Arc;
use tracing::debug;

/// Fluent builder for a [`SessionLifecycle`]
pub struct LobbyBuilder {
    backend: Arc<dyn MediaDevices>,
    config: LobbyConfig,
    user_agent: Option<String>,
}

impl std::fmt::Debug for LobbyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyBuilder")
            .field("config", &self.config)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl LobbyBuilder {
    /// Start from the default configuration
    pub fn new(backend: Arc<dyn MediaDevices>) -> Self {
        Self {
            backend,
            config: LobbyConfig::default(),
            user_agent: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Detect the platform from a browser user agent
    ///
    /// Overrides any platform set in the configuration.
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Force the platform
    pub fn platform(mut self, platform: Platform) -> Self {
        self.config.platform = platform;
        self.user_agent = None;
        self
    }

    /// Whether desktop acquires as soon as the context is ready
    pub fn auto_request_on_desktop(mut self, enabled: bool) -> Self {
        self.config.auto_request_on_desktop = enabled;
        self
    }

    /// Set camera preview profile
    pub fn video_profile(mut self, profile: VideoProfile) -> Self {
        self.config.video_profile = profile;
        self
    }

    /// Set level meter configuration
    pub fn analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.config.analyzer = analyzer;
        self
    }

    /// Whether to install a debug-level log subscriber on build
    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.config.debug_logging = enabled;
        self
    }

    /// Validate and build the lobby
    pub fn build(mut self) -> Result<SessionLifecycle, LobbyError> {
        if let Some(user_agent) = &self.user_agent {
            self.config.platform = Platform::from_user_agent(user_agent);
        }
        self.config.validate()?;

        if self.config.debug_logging {
            // Another subscriber may already be installed by the host
            if let Err(e) = logging::init_logging(true) {
                debug!("{}", e);
            }
        }

        SessionLifecycle::new(self.backend, self.config)
    }
}
