use std::path::PathBuf;
use thiserror::Error;

/// Result alias for every fallible engine stage
pub type Result<T> = std::result::Result<T, FitError>;

/// Failures that abort the size-fitting pipeline.
///
/// Only `ProbeFailure` is ever absorbed internally (by a fallback table); every
/// other variant surfaces to the caller with no partial output.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("Invalid segment '{spec}': {reason}")]
    InvalidSegment { spec: String, reason: String },

    #[error("Cut segments remove the entire clip")]
    EmptySegmentSet,

    #[error("No video budget left under the {cap_bytes} byte cap after {audio_bytes} bytes of audio")]
    BudgetExceeded { cap_bytes: u64, audio_bytes: u64 },

    #[error("Clip duration must be positive, got {0:.3}s")]
    InvalidDuration(f64),

    #[error("Clip duration {duration_s:.3}s exceeds the {limit_s:.0}s limit")]
    DurationExceeded { duration_s: f64, limit_s: f64 },

    #[error("Failed to probe {}: {message}", path.display())]
    ProbeFailure { path: PathBuf, message: String },

    #[error("Unsupported channel layout '{layout}' for the multichannel workaround")]
    UnsupportedLayout { layout: String },

    #[error("ffmpeg failed during {stage} ({status})\nCommand: {command}\n{stderr}")]
    EncodeFailure {
        stage: String,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FitError {
    pub fn invalid_segment(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProbeFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build an encode failure keeping only the last lines of stderr
    pub fn encode(
        stage: impl Into<String>,
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: &str,
    ) -> Self {
        Self::EncodeFailure {
            stage: stage.into(),
            command: command.into(),
            status: status.into(),
            stderr: stderr_tail(stderr, 10),
        }
    }

    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Self::ProbeFailure { .. })
    }
}

/// Keep the last `lines` lines of ffmpeg's stderr (most relevant part)
pub fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().collect();
    if all.len() > lines {
        all[all.len() - lines..].join("\n")
    } else {
        stderr.trim_end().to_string()
    }
}
