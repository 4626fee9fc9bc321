//! Tracing subscriber setup

use meetlobby_core::LobbyError;
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber for the lobby crates
///
/// `RUST_LOG` wins when set; otherwise the lobby crates log at `info`, or
/// `debug` when `debug` is true.
pub fn init_logging(debug: bool) -> Result<(), LobbyError> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,meetlobby={level},meetlobby_core={level},meetlobby_media={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LobbyError::Initialization {
            reason: format!("Failed to install log subscriber: {}", e),
        })
}
