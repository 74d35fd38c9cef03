//! Gate → canonicalize → score, with each stage's buffer released as soon as
//! the next stage has what it needs.

use crate::error::PipelineError;
use crate::metrics::MetricScorer;
use crate::quality::{QualityConfig, QualityGate};
use crate::runtime::TensorRuntime;
use crate::types::{LandmarkSet, PixelBuffer, QualityReport, SkinMetrics};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub quality: QualityReport,
    /// `None` when the quality gate rejected the photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SkinMetrics>,
}

pub struct AnalysisPipeline {
    gate: QualityGate,
    runtime: TensorRuntime,
    scorer: MetricScorer,
}

impl AnalysisPipeline {
    pub fn new(config: QualityConfig, runtime: TensorRuntime) -> Self {
        let scorer = MetricScorer::new(runtime.canonical_size());
        Self {
            gate: QualityGate::new(config),
            runtime,
            scorer,
        }
    }

    pub fn runtime(&mut self) -> &mut TensorRuntime {
        &mut self.runtime
    }

    pub fn analyze(
        &mut self,
        buffer: PixelBuffer,
        landmarks: &LandmarkSet,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.analyze_against(buffer, landmarks, None)
    }

    /// Like [`analyze`](Self::analyze), tagging trends against a previous report.
    pub fn analyze_against(
        &mut self,
        buffer: PixelBuffer,
        landmarks: &LandmarkSet,
        previous: Option<&SkinMetrics>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let quality = self.gate.validate(&buffer);
        if !quality.is_valid {
            tracing::info!(
                score = quality.score,
                issues = ?quality.issues,
                "photo rejected by quality gate"
            );
            return Ok(PipelineOutcome {
                quality,
                metrics: None,
            });
        }

        self.score(quality, buffer, landmarks, previous)
    }

    /// Score a photo the caller has already gated. The quality report is still
    /// computed and returned, but a rejection does not stop scoring.
    pub fn analyze_ungated(
        &mut self,
        buffer: PixelBuffer,
        landmarks: &LandmarkSet,
        previous: Option<&SkinMetrics>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let quality = self.gate.validate(&buffer);
        if !quality.is_valid {
            tracing::debug!(score = quality.score, "gate bypassed, scoring anyway");
        }
        self.score(quality, buffer, landmarks, previous)
    }

    fn score(
        &mut self,
        quality: QualityReport,
        buffer: PixelBuffer,
        landmarks: &LandmarkSet,
        previous: Option<&SkinMetrics>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let tensor = self.runtime.canonicalize(&buffer)?;
        drop(buffer);

        let metrics = self.scorer.score_against(&tensor, landmarks, previous)?;
        drop(tensor);

        Ok(PipelineOutcome {
            quality,
            metrics: Some(metrics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Landmark, CANONICAL_LANDMARK_COUNT};

    fn face_landmarks() -> LandmarkSet {
        vec![Landmark::new(0.5, 0.5, 0.0); CANONICAL_LANDMARK_COUNT].into()
    }

    fn relaxed() -> QualityConfig {
        QualityConfig {
            min_width: 16,
            min_height: 16,
            min_megapixels: 0.0,
            min_contrast: 0.0,
            min_sharpness: 0.0,
            require_face: false,
            ..QualityConfig::default()
        }
    }

    #[test]
    fn test_rejected_photo_has_no_metrics() {
        let mut pipeline = AnalysisPipeline::new(QualityConfig::default(), TensorRuntime::new(32));
        let outcome = pipeline
            .analyze(PixelBuffer::filled(64, 64, [128, 128, 128]), &face_landmarks())
            .unwrap();
        assert!(!outcome.quality.is_valid);
        assert!(outcome.metrics.is_none());
        // Rejection happens before the runtime is touched.
        assert!(!pipeline.runtime().is_initialized());
    }

    #[test]
    fn test_accepted_photo_is_scored() {
        let mut pipeline = AnalysisPipeline::new(relaxed(), TensorRuntime::new(32));
        let outcome = pipeline
            .analyze(PixelBuffer::filled(64, 64, [128, 128, 128]), &face_landmarks())
            .unwrap();
        assert!(outcome.quality.is_valid);
        let metrics = outcome.metrics.unwrap();
        assert_eq!(metrics.wrinkles.score, 100);
    }

    #[test]
    fn test_ungated_photo_is_scored_with_report() {
        let mut pipeline = AnalysisPipeline::new(QualityConfig::default(), TensorRuntime::new(32));
        let outcome = pipeline
            .analyze_ungated(
                PixelBuffer::filled(64, 64, [128, 128, 128]),
                &face_landmarks(),
                None,
            )
            .unwrap();
        assert!(!outcome.quality.is_valid);
        assert!(!outcome.quality.issues.is_empty());
        assert_eq!(outcome.metrics.unwrap().wrinkles.score, 100);
    }

    #[test]
    fn test_missing_landmarks_fail_after_gate() {
        let mut pipeline = AnalysisPipeline::new(relaxed(), TensorRuntime::new(32));
        let result = pipeline.analyze(
            PixelBuffer::filled(64, 64, [128, 128, 128]),
            &LandmarkSet::default(),
        );
        assert!(matches!(result, Err(PipelineError::NoFaceDetected)));
    }
}
