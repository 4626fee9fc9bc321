//! Cooperative per-frame task
//!
//! A [`FrameTask`] runs a tick closure once per frame interval until its
//! [`LivenessToken`] is cancelled. Cancellation is never forced: the loop
//! checks the token at the top of every iteration and simply stops
//! rescheduling itself.

use crate::error::{MediaError, MediaResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared liveness flag for a frame loop
///
/// Work done through [`run_if_live`](Self::run_if_live) and cancellation
/// through [`cancel_with`](Self::cancel_with) are mutually exclusive, so
/// nothing a tick publishes can land after the loop was cancelled.
#[derive(Debug, Clone)]
pub struct LivenessToken {
    live: Arc<Mutex<bool>>,
}

impl LivenessToken {
    /// Create a live token
    pub fn new() -> Self {
        Self {
            live: Arc::new(Mutex::new(true)),
        }
    }

    /// Whether the loop should keep running
    pub fn is_live(&self) -> bool {
        *self.live.lock()
    }

    /// Cancel the token. Returns whether it was live.
    pub fn cancel(&self) -> bool {
        let mut live = self.live.lock();
        std::mem::replace(&mut *live, false)
    }

    /// Cancel the token and run `f` before any tick can observe it
    pub fn cancel_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut live = self.live.lock();
        *live = false;
        f()
    }

    /// Run `f` only while the token is live
    pub fn run_if_live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let live = self.live.lock();
        if *live {
            Some(f())
        } else {
            None
        }
    }
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Self-rescheduling per-frame task
#[derive(Debug)]
pub struct FrameTask {
    token: LivenessToken,
    handle: JoinHandle<()>,
}

impl FrameTask {
    /// Spawn a loop calling `tick` every `interval` on the current runtime
    pub fn spawn<F>(name: &'static str, interval: Duration, mut tick: F) -> MediaResult<Self>
    where
        F: FnMut(&LivenessToken) + Send + 'static,
    {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| MediaError::InvalidState {
                message: format!("frame loop {} needs an async runtime: {}", name, e),
            })?;

        let token = LivenessToken::new();
        let loop_token = token.clone();
        let handle = runtime.spawn(async move {
            let mut frames = 0u64;
            loop {
                if !loop_token.is_live() {
                    break;
                }
                tick(&loop_token);
                frames += 1;
                tokio::time::sleep(interval).await;
            }
            debug!("🔁 Frame loop {} exited after {} frames", name, frames);
        });

        debug!("🔁 Frame loop {} started ({:?} per frame)", name, interval);
        Ok(Self { token, handle })
    }

    /// Whether the loop is still scheduled to run
    pub fn is_running(&self) -> bool {
        self.token.is_live()
    }

    /// Whether the loop body has fully returned
    pub fn has_exited(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop scheduling further frames
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop scheduling further frames and run `f` atomically with the stop
    pub fn stop_with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.token.cancel_with(f)
    }
}

impl Drop for FrameTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
