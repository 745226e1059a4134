pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use capture::PixelFormat;
pub use display::overlay::LabelFont;
use error::ConfigError;

/// Environment variables with this prefix override file settings (`ARGUS_SESSION__TIMEOUT_SECS=3`).
pub const ENV_PREFIX: &str = "ARGUS";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub streams: Vec<StreamConfig>,
    pub session: SessionConfig,
    pub motion: MotionConfig,
    pub recording: RecordingConfig,
    pub display: DisplayConfig,
    pub supervisor: SupervisorConfig,
}

/// One configured video stream. Optional fields override the session defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub motion_threshold: Option<f64>,
    #[serde(default)]
    pub record_on_motion: Option<bool>,
}

impl StreamConfig {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            timeout_secs: None,
            motion_threshold: None,
            record_on_motion: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Staleness threshold; half of it is the read-stall window
    pub timeout_secs: f64,
    pub max_reconnects: u32,
    pub reconnect_delay_ms: u64,
    pub preroll_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Minimum region area in pixels
    pub threshold: f64,
    pub history: u32,
    pub var_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub record_on_motion: bool,
    pub min_record_time_secs: f64,
    pub directory: PathBuf,
    pub min_file_size: u64,
    pub min_disk_space_gb: f64,
    pub indicator: bool,
    pub default_fps: f64,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub cell_width: u32,
    pub cell_height: u32,
    pub target_fps: u32,
    pub fill: [u8; 3],
    pub label_font: LabelFont,
    pub snapshot_on_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub startup_timeout_secs: f64,
    pub activity_interval_ms: u64,
    /// Composite frames buffered for the consumer before new ones are dropped
    pub output_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            max_reconnects: 5,
            reconnect_delay_ms: 1000,
            preroll_frames: pipeline::ringbuf::DEFAULT_PREROLL_FRAMES,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold: 500.0,
            history: 500,
            var_threshold: 16.0,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            record_on_motion: true,
            min_record_time_secs: 5.0,
            directory: PathBuf::from("recordings"),
            min_file_size: 1024,
            min_disk_space_gb: 1.0,
            indicator: true,
            default_fps: 20.0,
            jpeg_quality: 80,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cell_width: 640,
            cell_height: 480,
            target_fps: 30,
            fill: [0, 0, 0],
            label_font: LabelFont::Medium,
            snapshot_on_exit: false,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10.0,
            activity_interval_ms: 1000,
            output_queue: 2,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` (if given), then `ARGUS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.streams.is_empty() {
            return invalid("no streams configured");
        }
        if self.streams.iter().any(|s| s.uri.trim().is_empty()) {
            return invalid("stream with empty uri");
        }
        let timeouts = std::iter::once(self.session.timeout_secs)
            .chain(self.streams.iter().filter_map(|s| s.timeout_secs));
        for timeout in timeouts {
            if !(timeout.is_finite() && timeout > 0.0) {
                return invalid("timeout_secs must be positive");
            }
        }
        if self.session.preroll_frames == 0 {
            return invalid("session.preroll_frames must be at least 1");
        }
        if self.display.cell_width == 0 || self.display.cell_height == 0 {
            return invalid("display cell size must be non-zero");
        }
        if self.display.target_fps == 0 {
            return invalid("display.target_fps must be non-zero");
        }
        if !(self.recording.min_record_time_secs.is_finite() && self.recording.min_record_time_secs >= 0.0) {
            return invalid("recording.min_record_time_secs must be non-negative");
        }
        if !(self.supervisor.startup_timeout_secs.is_finite() && self.supervisor.startup_timeout_secs >= 0.0) {
            return invalid("supervisor.startup_timeout_secs must be non-negative");
        }
        if self.supervisor.activity_interval_ms == 0 {
            return invalid("supervisor.activity_interval_ms must be non-zero");
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.display.target_fps.max(1)))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.supervisor.startup_timeout_secs.max(0.0))
    }

    pub fn activity_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor.activity_interval_ms.max(1))
    }
}
