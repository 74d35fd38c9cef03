//! complexion-core — Face photo quality gate, landmark alignment, and skin metric scoring.
//!
//! The quality gate is pure statistics over decoded pixels. Alignment consumes
//! landmark sets from any [`detector::LandmarkDetector`]; metric scoring consumes
//! canonical tensors produced by a [`runtime::TensorRuntime`].

pub mod alignment;
pub mod decode;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod runtime;
pub mod types;

use std::path::PathBuf;

pub use alignment::{Alignment, LandmarkAligner};
pub use detector::{LandmarkDetector, MeshDetector};
pub use error::PipelineError;
pub use metrics::MetricScorer;
pub use pipeline::{AnalysisPipeline, PipelineOutcome};
pub use quality::{QualityConfig, QualityGate};
pub use runtime::{CanonicalTensor, TensorRuntime};
pub use types::{
    AlignmentResult, Concern, Grade, Landmark, LandmarkSet, MetricKind, MetricScore, PixelBuffer,
    QualityReport, Severity, SkinMetrics, Trend,
};

/// File name of the face-mesh model inside the model directory.
pub const FACE_MESH_MODEL: &str = "face_landmark.onnx";

/// Model directory: `COMPLEXION_MODEL_DIR`, else the system install location.
pub fn default_model_dir() -> PathBuf {
    std::env::var("COMPLEXION_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/usr/share/complexion/models"))
}
