// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the depth pipeline
//!
//! Errors are grouped by how far they propagate:
//!
//! - startup errors abort session construction
//! - session-ending errors stop one device loop and release its resources
//! - per-frame errors drop the derived data of the current frame only
//!
//! A missing modality in a capture is never an error; stages report it as
//! "no output" (`Ok(None)`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How far an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts session construction
    Startup,
    /// Ends the device session
    SessionEnding,
    /// Outcome depends on the configured timeout policy
    Recoverable,
    /// Drops the current frame's derived data, the loop continues
    PerFrame,
}

/// Errors produced by the capture/align/reproject pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// No device could be enumerated
    #[error("no depth camera device found")]
    DeviceUnavailable,
    /// The device exists but could not be opened
    #[error("failed to open device {index}: {reason}")]
    DeviceOpenFailed { index: u32, reason: String },
    /// Cameras could not be started with the requested configuration
    #[error("failed to start streaming: {0}")]
    StreamStartFailed(String),
    /// Device-reported calibration cannot be used for the configured mode
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    /// No synchronized capture arrived within the timeout
    #[error("timed out after {}ms waiting for a capture", timeout.as_millis())]
    CaptureTimeout { timeout: Duration },
    /// Hardware-level capture fault
    #[error("failed to get capture from device: {0}")]
    CaptureFailed(String),
    /// Depth could not be reprojected into the color camera
    #[error("depth-to-color alignment failed: {0}")]
    AlignmentFailed(String),
    /// Aligned depth could not be turned into a point cloud
    #[error("point cloud reprojection failed: {0}")]
    ReprojectionFailed(String),
    /// The presentation boundary failed to show a frame
    #[error("presentation failed: {0}")]
    Presentation(String),
}

impl PipelineError {
    /// Classify the error by its propagation scope
    pub fn severity(&self) -> Severity {
        match self {
            Self::DeviceUnavailable
            | Self::DeviceOpenFailed { .. }
            | Self::StreamStartFailed(_)
            | Self::InvalidCalibration(_) => Severity::Startup,
            Self::CaptureTimeout { .. } => Severity::Recoverable,
            Self::CaptureFailed(_) | Self::Presentation(_) => Severity::SessionEnding,
            Self::AlignmentFailed(_) | Self::ReprojectionFailed(_) => Severity::PerFrame,
        }
    }

    /// True if the error only affects the current frame
    pub fn is_per_frame(&self) -> bool {
        self.severity() == Severity::PerFrame
    }
}

/// Malformed image buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image has zero size ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
    #[error("stride {stride} is smaller than a row of {row_bytes} bytes")]
    StrideTooSmall { stride: u32, row_bytes: u32 },
    #[error("buffer holds {actual} bytes, {expected} required")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("expected {expected} image, got {actual}")]
    WrongFormat {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for the command-line application
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("failed to install Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        assert_eq!(PipelineError::DeviceUnavailable.severity(), Severity::Startup);
        assert_eq!(
            PipelineError::StreamStartFailed("bad mode".into()).severity(),
            Severity::Startup
        );
        assert_eq!(
            PipelineError::CaptureTimeout {
                timeout: Duration::from_millis(10)
            }
            .severity(),
            Severity::Recoverable
        );
        assert_eq!(
            PipelineError::CaptureFailed("usb".into()).severity(),
            Severity::SessionEnding
        );
        assert!(PipelineError::AlignmentFailed("x".into()).is_per_frame());
        assert!(PipelineError::ReprojectionFailed("x".into()).is_per_frame());
    }

    #[test]
    fn test_timeout_message() {
        let err = PipelineError::CaptureTimeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 250ms waiting for a capture"
        );
    }
}
