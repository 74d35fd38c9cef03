//! Error taxonomy shared by the aligner, the scorer, and the capabilities they consume.
//!
//! The quality gate never returns these; it folds failures into its report.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image could not be decoded: {0}")]
    DecodeFailure(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::DecodeFailure(err.to_string())
    }
}

impl From<base64::DecodeError> for PipelineError {
    fn from(err: base64::DecodeError) -> Self {
        PipelineError::DecodeFailure(format!("invalid base64 payload: {err}"))
    }
}
