//! Microphone level metering
//!
//! [`AudioLevelAnalyzer`] builds one frequency analysis node per attached
//! audio track and samples it every frame, publishing a normalized level in
//! `[0, 1]` on a watch channel. Stopping the meter publishes exactly 0 before
//! the loop can produce another value.

use crate::backend::{LevelSource, MediaDevices};
use crate::error::{MediaError, MediaResult};
use crate::frame_loop::FrameTask;
use crate::tracks::MediaSession;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Level meter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// FFT size of the analysis node; yields `fft_size / 2` bins
    pub fft_size: usize,
    /// Exponential smoothing factor in `[0, 1)`; 0 disables smoothing
    pub smoothing: f32,
    /// Sampling period in milliseconds
    pub frame_interval_ms: u64,
    /// Mean bin magnitude that maps to a full-scale level
    pub normalization_ceiling: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.0,
            frame_interval_ms: 16,
            normalization_ceiling: 128.0,
        }
    }
}

impl AnalyzerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), MediaError> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "FFT size must be a power of two between 32 and 32768, got {}",
                    self.fft_size
                ),
            });
        }

        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Smoothing must be in [0, 1), got {}", self.smoothing),
            });
        }

        if self.frame_interval_ms == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Frame interval must be > 0".to_string(),
            });
        }

        if !self.normalization_ceiling.is_finite()
            || self.normalization_ceiling <= 0.0
            || self.normalization_ceiling > 255.0
        {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "Normalization ceiling must be in (0, 255], got {}",
                    self.normalization_ceiling
                ),
            });
        }

        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Normalized level of one frame of frequency bins
pub fn compute_level(bins: &[u8], ceiling: f32) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    let mean = sum as f32 / bins.len() as f32;
    (mean / ceiling).clamp(0.0, 1.0)
}

struct AnalyzerNode {
    track_id: String,
    source: Arc<Mutex<Box<dyn LevelSource>>>,
}

/// Per-frame microphone level meter
pub struct AudioLevelAnalyzer {
    config: AnalyzerConfig,
    node: Option<AnalyzerNode>,
    task: Option<FrameTask>,
    publisher: Arc<watch::Sender<f32>>,
}

impl std::fmt::Debug for AudioLevelAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioLevelAnalyzer")
            .field("config", &self.config)
            .field("track_id", &self.attached_track_id())
            .field("running", &self.is_running())
            .field("level", &self.level())
            .finish()
    }
}

impl AudioLevelAnalyzer {
    /// Create a detached analyzer
    pub fn new(config: AnalyzerConfig) -> Self {
        let (publisher, _) = watch::channel(0.0);
        Self {
            config,
            node: None,
            task: None,
            publisher: Arc::new(publisher),
        }
    }

    /// Build a graph for the session's audio track and start sampling
    ///
    /// Any previously attached graph is torn down first.
    pub fn attach(&mut self, backend: &dyn MediaDevices, session: &MediaSession) -> MediaResult<()> {
        self.detach();

        let track = session
            .audio_track()
            .ok_or_else(|| MediaError::InvalidState {
                message: format!("session {} has no audio track to meter", session.id()),
            })?;
        let source = backend.build_analyzer(track, &self.config)?;

        info!("🎚️ Attached level meter to track {}", track.id());
        self.node = Some(AnalyzerNode {
            track_id: track.id().to_string(),
            source: Arc::new(Mutex::new(source)),
        });
        self.start()?;
        Ok(())
    }

    /// Stop sampling and tear down the graph
    pub fn detach(&mut self) {
        self.stop();
        if let Some(node) = self.node.take() {
            node.source.lock().close();
            info!("🎚️ Detached level meter from track {}", node.track_id);
        }
    }

    /// Start or resume sampling with the existing node
    ///
    /// Returns false when no graph is attached.
    pub fn start(&mut self) -> MediaResult<bool> {
        let Some(node) = &self.node else {
            return Ok(false);
        };
        if self.task.as_ref().is_some_and(|t| t.is_running()) {
            return Ok(true);
        }

        let source = node.source.clone();
        let publisher = self.publisher.clone();
        let ceiling = self.config.normalization_ceiling;
        let smoothing = self.config.smoothing;
        let mut bins = vec![0u8; source.lock().bin_count()];
        let mut previous = 0.0f32;

        let task = FrameTask::spawn("audio-level", self.config.frame_interval(), move |token| {
            let current = {
                let mut source = source.lock();
                source.read_frequency_data(&mut bins);
                compute_level(&bins, ceiling)
            };
            let level = smoothing * previous + (1.0 - smoothing) * current;
            previous = level;
            token.run_if_live(|| publisher.send_replace(level));
        })?;

        debug!("🎚️ Level sampling started");
        self.task = Some(task);
        Ok(true)
    }

    /// Stop sampling and publish a level of exactly 0
    ///
    /// The graph stays attached so [`start`](Self::start) can resume it.
    pub fn stop(&mut self) {
        match self.task.take() {
            Some(task) => {
                task.stop_with(|| self.publisher.send_replace(0.0));
                debug!("🎚️ Level sampling stopped");
            }
            None => {
                self.publisher.send_replace(0.0);
            }
        }
    }

    /// Sample the attached node once, without publishing
    pub fn sample_once(&self) -> Option<f32> {
        let node = self.node.as_ref()?;
        let mut source = node.source.lock();
        let mut bins = vec![0u8; source.bin_count()];
        source.read_frequency_data(&mut bins);
        Some(compute_level(&bins, self.config.normalization_ceiling))
    }

    /// Latest published level
    pub fn level(&self) -> f32 {
        *self.publisher.borrow()
    }

    /// Receive level updates
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.publisher.subscribe()
    }

    /// Whether the sampling loop is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| t.is_running())
    }

    /// Whether an analysis graph is attached
    pub fn has_graph(&self) -> bool {
        self.node.is_some()
    }

    /// Track the graph is attached to
    pub fn attached_track_id(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.track_id.as_str())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl Drop for AudioLevelAnalyzer {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_level() {
        assert_eq!(compute_level(&[], 128.0), 0.0);
        assert_eq!(compute_level(&[0; 128], 128.0), 0.0);
        assert_eq!(compute_level(&[64; 128], 128.0), 0.5);
        assert_eq!(compute_level(&[255; 128], 128.0), 1.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());

        let config = AnalyzerConfig {
            fft_size: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalyzerConfig {
            smoothing: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        for ceiling in [f32::NAN, f32::INFINITY, 0.0, 300.0] {
            let config = AnalyzerConfig {
                normalization_ceiling: ceiling,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "ceiling {} accepted", ceiling);
        }
    }

    #[test]
    fn test_detached_analyzer_reports_silence() {
        let mut analyzer = AudioLevelAnalyzer::new(AnalyzerConfig::default());
        assert!(!analyzer.has_graph());
        assert_eq!(analyzer.sample_once(), None);
        assert!(!analyzer.start().unwrap());
        assert_eq!(analyzer.level(), 0.0);
    }
}
