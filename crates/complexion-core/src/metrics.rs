//! Skin metric scoring over a canonical tensor.
//!
//! Eight independent statistics are computed concurrently from the same
//! tensor (and, for firmness, the landmark geometry), mapped to 0–100 scores,
//! and turned into concerns and recommendation text.

use crate::error::PipelineError;
use crate::runtime::CanonicalTensor;
use crate::types::{
    luma, Concern, Grade, LandmarkSet, MetricKind, MetricScore, Severity, SkinMetrics, Trend,
};
use ndarray::{Array2, ArrayView3, Axis};
use rayon::prelude::*;
use std::time::Instant;

/// Metrics scoring below this raise a concern.
pub const CONCERN_THRESHOLD: u8 = 60;
const HIGH_SEVERITY_BELOW: u8 = 40;
const MEDIUM_SEVERITY_BELOW: u8 = 50;

pub const MAX_RECOMMENDATIONS: usize = 5;
pub const DEFAULT_RECOMMENDATION: &str =
    "Your skin is in good shape. Maintain your current routine and keep tracking your progress.";

/// Score change (in points) that counts as a trend.
const TREND_DELTA: i16 = 5;

// Raw statistic → score mappings. Tensor samples are in [0, 1], so variances
// fall in [0, 0.25] and means in [0, 1].
const WRINKLE_VARIANCE_SCALE: f32 = 1200.0;
const WRINKLE_BROW_BIAS: f32 = 1.15;
const SPOT_VARIANCE_SCALE: f32 = 1000.0;
const TEXTURE_VARIANCE_SCALE: f32 = 25.0;
const PORE_VARIANCE_SCALE: f32 = 40.0;
const EVENNESS_VARIANCE_SCALE: f32 = 30.0;
const FIRMNESS_REFERENCE_Y: f32 = 0.70;
const FIRMNESS_SAG_SCALE: f32 = 400.0;
const RADIANCE_SCALE: f32 = 120.0;
const HYDRATION_OFFSET: f32 = 25.0;
const HYDRATION_SCALE: f32 = 90.0;

/// Brow-region landmarks; their presence biases the wrinkle signal.
const BROW_INDICES: [usize; 10] = [70, 63, 105, 66, 107, 336, 296, 334, 293, 300];
/// Jawline landmarks used for firmness.
const JAWLINE_INDICES: [usize; 13] = [
    172, 136, 150, 149, 176, 148, 152, 377, 400, 378, 379, 365, 397,
];

/// Read-only inputs shared by every metric computation.
struct ScoringInput<'a> {
    tensor: ArrayView3<'a, f32>,
    luminance: &'a Array2<f32>,
    landmarks: &'a LandmarkSet,
}

/// Scores canonical tensors of one fixed square size.
#[derive(Debug, Clone)]
pub struct MetricScorer {
    canonical_size: usize,
}

impl MetricScorer {
    pub fn new(canonical_size: usize) -> Self {
        Self { canonical_size }
    }

    pub fn canonical_size(&self) -> usize {
        self.canonical_size
    }

    /// Score a photo with no prior report; every trend is `stable`.
    pub fn score(
        &self,
        tensor: &CanonicalTensor,
        landmarks: &LandmarkSet,
    ) -> Result<SkinMetrics, PipelineError> {
        self.score_against(tensor, landmarks, None)
    }

    /// Score a photo, tagging trends relative to `previous` when given.
    pub fn score_against(
        &self,
        tensor: &CanonicalTensor,
        landmarks: &LandmarkSet,
        previous: Option<&SkinMetrics>,
    ) -> Result<SkinMetrics, PipelineError> {
        let started = Instant::now();

        let expected = [self.canonical_size, self.canonical_size, 3];
        let actual = tensor.shape();
        if actual != expected {
            return Err(PipelineError::ShapeMismatch { expected, actual });
        }
        if landmarks.is_empty() {
            return Err(PipelineError::NoFaceDetected);
        }

        let view = tensor.view();
        let luminance = view.map_axis(Axis(2), |px| luma(px[0], px[1], px[2]));
        let input = ScoringInput {
            tensor: view,
            luminance: &luminance,
            landmarks,
        };

        let scores: Vec<u8> = MetricKind::ALL
            .as_slice()
            .par_iter()
            .map(|&kind| to_score(raw_score(kind, &input)))
            .collect();

        let graded = |i: usize| {
            let kind = MetricKind::ALL[i];
            let score = scores[i];
            MetricScore {
                score,
                grade: Grade::from_score(score),
                trend: previous.map_or(Trend::Stable, |p| trend(p.metric(kind).score, score)),
            }
        };

        let pairs: Vec<(MetricKind, u8)> = MetricKind::ALL
            .iter()
            .copied()
            .zip(scores.iter().copied())
            .collect();
        let concerns = concerns_for(&pairs);
        let recommendations = recommendations_for(&concerns);
        let overall_score = overall(&scores);

        let metrics = SkinMetrics {
            wrinkles: graded(0),
            spots: graded(1),
            texture: graded(2),
            pores: graded(3),
            evenness: graded(4),
            firmness: graded(5),
            radiance: graded(6),
            hydration: graded(7),
            overall_score,
            concerns,
            recommendations,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        tracing::debug!(
            overall = metrics.overall_score,
            concerns = metrics.concerns.len(),
            elapsed_ms = metrics.processing_time_ms,
            "skin metrics computed"
        );

        Ok(metrics)
    }
}

fn to_score(raw: f32) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn variance<'a>(values: impl Iterator<Item = &'a f32>) -> f32 {
    let (mut sum, mut sum_sq, mut n) = (0.0f64, 0.0f64, 0usize);
    for &v in values {
        let v = v as f64;
        sum += v;
        sum_sq += v * v;
        n += 1;
    }
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0) as f32
}

fn mean<'a>(values: impl Iterator<Item = &'a f32>) -> f32 {
    let (mut sum, mut n) = (0.0f64, 0usize);
    for &v in values {
        sum += v as f64;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        (sum / n as f64) as f32
    }
}

fn raw_score(kind: MetricKind, input: &ScoringInput<'_>) -> f32 {
    match kind {
        MetricKind::Wrinkles => {
            let brow_present = BROW_INDICES.iter().all(|&i| input.landmarks.get(i).is_some());
            let bias = if brow_present { WRINKLE_BROW_BIAS } else { 1.0 };
            100.0 - variance(input.luminance.iter()) * bias * WRINKLE_VARIANCE_SCALE
        }
        MetricKind::Spots => {
            let per_channel = (0..3)
                .map(|c| variance(input.tensor.index_axis(Axis(2), c).iter()))
                .sum::<f32>()
                / 3.0;
            100.0 - per_channel * SPOT_VARIANCE_SCALE
        }
        MetricKind::Texture => {
            100.0 / (1.0 + variance(input.luminance.iter()) * TEXTURE_VARIANCE_SCALE)
        }
        MetricKind::Pores => 100.0 / (1.0 + variance(input.luminance.iter()) * PORE_VARIANCE_SCALE),
        MetricKind::Evenness => {
            100.0 / (1.0 + variance(input.tensor.iter()) * EVENNESS_VARIANCE_SCALE)
        }
        MetricKind::Firmness => {
            let jaw: Vec<f32> = JAWLINE_INDICES
                .iter()
                .filter_map(|&i| input.landmarks.get(i).map(|p| p.y))
                .collect();
            let jaw_y = if jaw.is_empty() {
                mean(input.landmarks.points().iter().map(|p| &p.y))
            } else {
                mean(jaw.iter())
            };
            100.0 - (jaw_y - FIRMNESS_REFERENCE_Y).max(0.0) * FIRMNESS_SAG_SCALE
        }
        MetricKind::Radiance => mean(input.tensor.iter()) * RADIANCE_SCALE,
        MetricKind::Hydration => HYDRATION_OFFSET + mean(input.luminance.iter()) * HYDRATION_SCALE,
    }
}

fn trend(previous: u8, current: u8) -> Trend {
    let delta = current as i16 - previous as i16;
    if delta >= TREND_DELTA {
        Trend::Improving
    } else if delta <= -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Rounded mean of the scores.
pub fn overall(scores: &[u8]) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let sum: u32 = scores.iter().map(|&s| s as u32).sum();
    (sum as f64 / scores.len() as f64).round() as u8
}

pub fn severity_for(score: u8) -> Severity {
    if score < HIGH_SEVERITY_BELOW {
        Severity::High
    } else if score < MEDIUM_SEVERITY_BELOW {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Linear in the distance below the concern threshold: 0.5 just below it, 1.0 at zero.
pub fn concern_confidence(score: u8) -> f32 {
    let distance = CONCERN_THRESHOLD.saturating_sub(score) as f32;
    (0.5 + 0.5 * distance / CONCERN_THRESHOLD as f32).clamp(0.5, 1.0)
}

/// One concern per metric below the threshold, worst first.
pub fn concerns_for(scores: &[(MetricKind, u8)]) -> Vec<Concern> {
    let mut below: Vec<(MetricKind, u8)> = scores
        .iter()
        .copied()
        .filter(|&(_, score)| score < CONCERN_THRESHOLD)
        .collect();
    below.sort_by_key(|&(_, score)| score);

    below
        .into_iter()
        .map(|(kind, score)| Concern {
            kind,
            severity: severity_for(score),
            confidence: concern_confidence(score),
        })
        .collect()
}

fn recommendation(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Wrinkles => {
            "Apply a retinoid serum at night and wear SPF 30+ sunscreen every day."
        }
        MetricKind::Spots | MetricKind::Evenness => {
            "Use a vitamin C serum in the morning with broad-spectrum sunscreen to even out tone."
        }
        MetricKind::Texture | MetricKind::Pores => {
            "Exfoliate gently two to three times a week with an AHA or BHA product."
        }
        MetricKind::Firmness => {
            "Consider collagen-supporting care such as peptide serums or in-clinic firming treatments."
        }
        MetricKind::Radiance => {
            "Add an antioxidant serum and keep a consistent sleep schedule to restore radiance."
        }
        MetricKind::Hydration => {
            "Use a hyaluronic acid serum and a barrier-repair moisturizer twice daily."
        }
    }
}

/// Deduplicated recommendation text for `concerns`, capped at [`MAX_RECOMMENDATIONS`].
pub fn recommendations_for(concerns: &[Concern]) -> Vec<String> {
    if concerns.is_empty() {
        return vec![DEFAULT_RECOMMENDATION.to_string()];
    }

    let mut out: Vec<String> = Vec::new();
    for concern in concerns {
        let text = recommendation(concern.kind);
        if !out.iter().any(|r| r == text) {
            out.push(text.to_string());
        }
        if out.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }
    out
}
