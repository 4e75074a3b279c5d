//! Error types shared across Longexpo crates.

use std::path::PathBuf;

use longexpo_frame_model::{ConfigError, FrameError, Size};

/// Top-level error type for Longexpo operations.
///
/// Low-confidence registration is absent: it degrades to an
/// identity offset and never aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum LongExposureError {
    #[error("No frames to composite")]
    EmptyInput,

    #[error("Dimension mismatch at frame {index}: expected {expected}, got {actual}")]
    DimensionMismatch {
        index: usize,
        expected: Size,
        actual: Size,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Frame source error: {message}")]
    Source { message: String },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LongExposureError.
pub type LongExposureResult<T> = Result<T, LongExposureError>;

impl LongExposureError {
    pub fn frame_source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn dimension_mismatch(index: usize, expected: Size, actual: Size) -> Self {
        Self::DimensionMismatch {
            index,
            expected,
            actual,
        }
    }

    /// True for the cooperative-cancellation outcome.
    ///
    /// Cancellation travels through the error channel but is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<FrameError> for LongExposureError {
    fn from(err: FrameError) -> Self {
        Self::InvalidFrame {
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for LongExposureError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message_has_context() {
        let err = LongExposureError::dimension_mismatch(5, Size::new(100, 80), Size::new(200, 80));
        let msg = err.to_string();
        assert!(msg.contains("frame 5"));
        assert!(msg.contains("100x80"));
        assert!(msg.contains("200x80"));
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(LongExposureError::Cancelled.is_cancelled());
        assert!(!LongExposureError::EmptyInput.is_cancelled());
    }

    #[test]
    fn test_frame_error_converts() {
        let err: LongExposureError = FrameError::ZeroDimension {
            size: Size::new(0, 3),
        }
        .into();
        assert!(matches!(err, LongExposureError::InvalidFrame { .. }));
        assert!(err.to_string().contains("0x3"));
    }
}
