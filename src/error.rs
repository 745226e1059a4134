//! Error taxonomy for sources, sessions, recordings and the supervisor

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capture::PixelFormat;

/// Failures reported by a frame transport.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {uri}: {reason}")]
    Open { uri: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("no transport registered for {0}")]
    UnsupportedUri(String),

    #[error("source closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JPEG decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),

    #[error("JPEG stream carried no image info")]
    MissingInfo,

    #[error("unsupported JPEG pixel format {0:?}")]
    UnsupportedJpeg(jpeg_decoder::PixelFormat),

    #[error("{format:?} buffer of {actual} bytes does not fit {width}x{height} (need {expected})")]
    Geometry {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Per-session faults. None of these leave the session's worker.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect failure: {0}")]
    ConnectFailure(#[source] SourceError),

    #[error("no frame within {0:?}")]
    ReadStall(Duration),

    #[error("gave up after {attempts} failed reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("worker fault: {0}")]
    WorkerFault(String),
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("recording denied: {available_gb:.2} GB free at {}, {required_gb:.2} GB required", directory.display())]
    InsufficientSpace {
        directory: PathBuf,
        available_gb: f64,
        required_gb: f64,
    },

    #[error("recording denied: cannot query free space at {}: {source}", directory.display())]
    SpaceProbe {
        directory: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recording denied: cannot open sink {}: {reason}", path.display())]
    SinkOpen { path: PathBuf, reason: String },

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordingError {
    /// True for the `RecordingStartDenied` family: recording is skipped, nothing else changes.
    pub fn is_start_denied(&self) -> bool {
        matches!(
            self,
            Self::InsufficientSpace { .. } | Self::SpaceProbe { .. } | Self::SinkOpen { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no session became active within {0:?}")]
    NoActiveSessions(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
