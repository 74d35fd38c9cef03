//! Facial landmark detection capability.
//!
//! The pipeline only consumes landmarks; [`LandmarkDetector`] is the seam.
//! [`MeshDetector`] adapts a 468-point face-mesh ONNX model through ONNX Runtime.

use crate::error::PipelineError;
use crate::types::{Landmark, LandmarkSet, PixelBuffer, CANONICAL_LANDMARK_COUNT};
use crate::runtime::resize_rgb;
use ndarray::{Array4, Axis};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (face-mesh model contract) ---
const MESH_INPUT_SIZE: usize = 192;
const MESH_VALUES_PER_POINT: usize = 3;
/// Minimum face-presence probability to accept a detection.
const MESH_PRESENCE_THRESHOLD: f32 = 0.5;

/// Produces zero or one landmark set per image.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Option<LandmarkSet>, PipelineError>;
}

impl<T: LandmarkDetector + ?Sized> LandmarkDetector for &mut T {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Option<LandmarkSet>, PipelineError> {
        (**self).detect(image)
    }
}

impl<T: LandmarkDetector + ?Sized> LandmarkDetector for Box<T> {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Option<LandmarkSet>, PipelineError> {
        (**self).detect(image)
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — place the face-mesh ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<DetectorError> for PipelineError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::ModelNotFound(_) => {
                PipelineError::CapabilityUnavailable(err.to_string())
            }
            DetectorError::InferenceFailed(msg) => PipelineError::AnalysisFailed(msg),
            DetectorError::Ort(e) => PipelineError::CapabilityUnavailable(format!("ort: {e}")),
        }
    }
}

/// Output tensor indices: (landmarks, face presence).
type MeshOutputIndices = (usize, Option<usize>);

/// Face-mesh landmark detector.
pub struct MeshDetector {
    session: Session,
    outputs: MeshOutputIndices,
}

impl MeshDetector {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face-mesh model"
        );

        if output_names.is_empty() {
            return Err(DetectorError::InferenceFailed(
                "face-mesh model exposes no outputs".into(),
            ));
        }

        let outputs = discover_output_indices(&output_names);
        tracing::debug!(?outputs, "face-mesh output tensor mapping");

        Ok(Self { session, outputs })
    }

    /// Run the model and return landmarks normalized to the input image extent.
    pub fn detect_landmarks(
        &mut self,
        image: &PixelBuffer,
    ) -> Result<Option<LandmarkSet>, DetectorError> {
        let (landmark_idx, presence_idx) = self.outputs;
        let input = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        if let Some(idx) = presence_idx {
            let (_, logits) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("face presence: {e}")))?;
            let presence = logits.first().copied().map(sigmoid).unwrap_or(0.0);
            if presence < MESH_PRESENCE_THRESHOLD {
                tracing::debug!(presence, "face-mesh: no face");
                return Ok(None);
            }
        }

        let (_, raw) = outputs[landmark_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;

        decode_landmarks(raw).map(Some)
    }
}

impl LandmarkDetector for MeshDetector {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Option<LandmarkSet>, PipelineError> {
        Ok(self.detect_landmarks(image)?)
    }
}

/// Discover output ordering by name.
///
/// Face-mesh exports name their outputs e.g. "conv2d_21" / "conv2d_31" or
/// "landmarks" / "face_flag". Names containing "landmark" or "flag"/"score"/"presence"
/// are matched; otherwise falls back to positional ordering [0]=landmarks, [1]=presence.
fn discover_output_indices(names: &[String]) -> MeshOutputIndices {
    let find = |keys: &[&str]| {
        names.iter().position(|n| {
            let n = n.to_ascii_lowercase();
            keys.iter().any(|k| n.contains(k))
        })
    };

    match (find(&["landmark"]), find(&["flag", "score", "presence"])) {
        (Some(lm), presence) => (lm, presence),
        _ => {
            tracing::info!(
                ?names,
                "face-mesh: output names not recognized, using positional mapping [0]=landmarks, [1]=presence"
            );
            (0, (names.len() > 1).then_some(1))
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Resize to the model input into an NHWC tensor in [0, 1].
fn preprocess(image: &PixelBuffer) -> Array4<f32> {
    resize_rgb(image, MESH_INPUT_SIZE, MESH_INPUT_SIZE).insert_axis(Axis(0))
}

/// Convert raw model output (x, y, z in input-pixel units) to normalized landmarks.
fn decode_landmarks(raw: &[f32]) -> Result<LandmarkSet, DetectorError> {
    let needed = CANONICAL_LANDMARK_COUNT * MESH_VALUES_PER_POINT;
    if raw.len() < needed {
        return Err(DetectorError::InferenceFailed(format!(
            "expected at least {needed} landmark values, got {}",
            raw.len()
        )));
    }

    let size = MESH_INPUT_SIZE as f32;
    let points = raw[..needed]
        .chunks_exact(MESH_VALUES_PER_POINT)
        .map(|p| Landmark::new(p[0] / size, p[1] / size, p[2] / size))
        .collect::<Vec<_>>();

    Ok(LandmarkSet::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model() {
        let result = MeshDetector::load("/nonexistent/face_landmark.onnx");
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_missing_model_maps_to_capability_unavailable() {
        let err: PipelineError = DetectorError::ModelNotFound("x".into()).into();
        assert!(matches!(err, PipelineError::CapabilityUnavailable(_)));
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["face_flag", "landmarks"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, Some(0)));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["conv2d_21", "conv2d_31"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, Some(1)));

        let single = vec!["output_0".to_string()];
        assert_eq!(discover_output_indices(&single), (0, None));
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = PixelBuffer::filled(400, 300, [255, 0, 51]);
        let tensor = preprocess(&img);
        assert_eq!(tensor.shape(), &[1, MESH_INPUT_SIZE, MESH_INPUT_SIZE, 3]);
        assert!((tensor[[0, 10, 10, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 10, 10, 1]].abs() < 1e-6);
        assert!((tensor[[0, 191, 191, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_normalizes() {
        let mut raw = vec![0.0f32; CANONICAL_LANDMARK_COUNT * 3];
        raw[3] = 96.0;
        raw[4] = 48.0;
        raw[5] = 19.2;
        let set = decode_landmarks(&raw).unwrap();
        assert_eq!(set.len(), CANONICAL_LANDMARK_COUNT);
        let nose = set.get(1).unwrap();
        assert!((nose.x - 0.5).abs() < 1e-6);
        assert!((nose.y - 0.25).abs() < 1e-6);
        assert!((nose.z - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_too_short() {
        assert!(matches!(
            decode_landmarks(&[0.0; 10]),
            Err(DetectorError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
    }
}
