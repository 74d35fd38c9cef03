//! Photo-to-baseline alignment via a 4-DOF similarity transform.
//!
//! The transform is estimated in closed form from a fixed subset of stable
//! face-mesh landmarks (face-oval extremes, eye corners, nose tip, mouth
//! corners), then applied to the full source image with a bilinear affine warp
//! into the target's canvas.

use crate::decode;
use crate::detector::LandmarkDetector;
use crate::error::PipelineError;
use crate::types::{
    AlignmentResult, LandmarkSet, PixelBuffer, Translation, CANONICAL_LANDMARK_COUNT,
};

/// Face-mesh indices that stay put under expression changes.
pub const KEY_LANDMARK_INDICES: [usize; 11] = [
    10,  // forehead top (face oval)
    152, // chin (face oval)
    234, // left face edge
    454, // right face edge
    33,  // left eye outer corner
    133, // left eye inner corner
    362, // right eye inner corner
    263, // right eye outer corner
    1,   // nose tip
    61,  // left mouth corner
    291, // right mouth corner
];

const WELL_ALIGNED_THRESHOLD: f32 = 0.70;

// Residual references (normalized image units) and their weights.
const MEAN_RESIDUAL_REF: f32 = 0.15;
const MAX_RESIDUAL_REF: f32 = 0.3;
const STD_RESIDUAL_REF: f32 = 0.1;
const MEAN_RESIDUAL_WEIGHT: f32 = 0.7;
const MAX_RESIDUAL_WEIGHT: f32 = 0.2;
const STD_RESIDUAL_WEIGHT: f32 = 0.1;

const CONFIDENCE_SCORE_WEIGHT: f32 = 0.7;
const CONFIDENCE_COMPLETENESS_WEIGHT: f32 = 0.3;

type Point = (f32, f32);

/// Uniform scale, rotation (radians), then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub scale: f32,
    pub rotation: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn apply(&self, (x, y): Point) -> Point {
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.scale * (cos * x - sin * y) + self.tx,
            self.scale * (sin * x + cos * y) + self.ty,
        )
    }

    /// Row-major 3×3 homogeneous matrix.
    /// ```text
    /// | s·cosθ  -s·sinθ  tx |
    /// | s·sinθ   s·cosθ  ty |
    /// |   0        0      1 |
    /// ```
    pub fn matrix(&self) -> [[f32; 3]; 3] {
        let (sin, cos) = self.rotation.sin_cos();
        let (a, b) = (self.scale * cos, self.scale * sin);
        [[a, -b, self.tx], [b, a, self.ty], [0.0, 0.0, 1.0]]
    }
}

/// Corresponding (source, target) key points.
///
/// Uses [`KEY_LANDMARK_INDICES`] when both sets are long enough to hold them,
/// otherwise every index the two sets share.
pub fn key_point_pairs(source: &LandmarkSet, target: &LandmarkSet) -> Vec<(Point, Point)> {
    let pair = |i: usize| {
        let s = source.get(i)?;
        let t = target.get(i)?;
        Some(((s.x, s.y), (t.x, t.y)))
    };

    let keyed: Vec<_> = KEY_LANDMARK_INDICES.iter().filter_map(|&i| pair(i)).collect();
    if keyed.len() == KEY_LANDMARK_INDICES.len() {
        return keyed;
    }
    (0..source.len().min(target.len())).filter_map(pair).collect()
}

fn centroid(points: impl Iterator<Item = Point>) -> Point {
    let (mut sx, mut sy, mut n) = (0.0f32, 0.0f32, 0usize);
    for (x, y) in points {
        sx += x;
        sy += y;
        n += 1;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    (sx / n as f32, sy / n as f32)
}

/// Closed-form similarity estimate mapping the source points onto the target points.
///
/// Scale is the ratio of mean radial distances about each centroid; rotation
/// is `atan2(Σ cross, Σ dot)` over the centred pairs; translation carries the
/// source centroid onto the target centroid.
pub fn estimate_similarity(pairs: &[(Point, Point)]) -> SimilarityTransform {
    if pairs.is_empty() {
        return SimilarityTransform::identity();
    }

    let cs = centroid(pairs.iter().map(|p| p.0));
    let ct = centroid(pairs.iter().map(|p| p.1));

    let mut radius_s = 0.0f32;
    let mut radius_t = 0.0f32;
    let mut cross = 0.0f32;
    let mut dot = 0.0f32;

    for &((sx, sy), (tx, ty)) in pairs {
        let (xs, ys) = (sx - cs.0, sy - cs.1);
        let (xt, yt) = (tx - ct.0, ty - ct.1);
        radius_s += (xs * xs + ys * ys).sqrt();
        radius_t += (xt * xt + yt * yt).sqrt();
        cross += xs * yt - ys * xt;
        dot += xs * xt + ys * yt;
    }

    let scale = if radius_s > f32::EPSILON {
        radius_t / radius_s
    } else {
        1.0
    };
    let rotation = cross.atan2(dot);

    let rotated = SimilarityTransform {
        scale,
        rotation,
        tx: 0.0,
        ty: 0.0,
    }
    .apply(cs);

    SimilarityTransform {
        scale,
        rotation,
        tx: ct.0 - rotated.0,
        ty: ct.1 - rotated.1,
    }
}

/// Weighted residual score in [0, 1]; 1 means the key points coincide exactly.
pub fn residual_score(transform: &SimilarityTransform, pairs: &[(Point, Point)]) -> f32 {
    if pairs.is_empty() {
        return 0.0;
    }

    let residuals: Vec<f32> = pairs
        .iter()
        .map(|&(s, t)| {
            let (x, y) = transform.apply(s);
            ((x - t.0).powi(2) + (y - t.1).powi(2)).sqrt()
        })
        .collect();

    let n = residuals.len() as f32;
    let mean = residuals.iter().sum::<f32>() / n;
    let max = residuals.iter().copied().fold(0.0f32, f32::max);
    let std = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n).sqrt();

    let term = |value: f32, reference: f32| 1.0 - (value / reference).clamp(0.0, 1.0);

    let score = MEAN_RESIDUAL_WEIGHT * term(mean, MEAN_RESIDUAL_REF)
        + MAX_RESIDUAL_WEIGHT * term(max, MAX_RESIDUAL_REF)
        + STD_RESIDUAL_WEIGHT * term(std, STD_RESIDUAL_REF);
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

pub fn is_well_aligned(score: f32) -> bool {
    score >= WELL_ALIGNED_THRESHOLD
}

/// Estimate the alignment between two landmark sets without touching pixels.
pub fn align_landmarks(
    source: &LandmarkSet,
    target: &LandmarkSet,
) -> Result<(SimilarityTransform, AlignmentResult), PipelineError> {
    if source.is_empty() || target.is_empty() {
        return Err(PipelineError::NoFaceDetected);
    }

    let pairs = key_point_pairs(source, target);
    if pairs.len() < 2 {
        return Err(PipelineError::AnalysisFailed(format!(
            "need at least two corresponding landmarks, got {}",
            pairs.len()
        )));
    }

    let finite = |p: Point| p.0.is_finite() && p.1.is_finite();
    if !pairs.iter().all(|&(s, t)| finite(s) && finite(t)) {
        return Err(PipelineError::AnalysisFailed(
            "landmark coordinates must be finite".into(),
        ));
    }

    let transform = estimate_similarity(&pairs);
    let alignment_score = residual_score(&transform, &pairs);

    let completeness =
        (source.len().min(target.len()) as f32 / CANONICAL_LANDMARK_COUNT as f32).min(1.0);
    let confidence = (CONFIDENCE_SCORE_WEIGHT * alignment_score
        + CONFIDENCE_COMPLETENESS_WEIGHT * completeness)
        .clamp(0.0, 1.0);

    let result = AlignmentResult {
        transform: transform.matrix(),
        alignment_score,
        confidence,
        rotation_degrees: transform.rotation.to_degrees(),
        scale: transform.scale,
        translation: Translation {
            x: transform.tx,
            y: transform.ty,
        },
        source_landmark_count: source.len(),
        target_landmark_count: target.len(),
    };

    Ok((transform, result))
}

/// Rescale a normalized-coordinate transform into a 2×3 pixel-space matrix
/// `[a, b, c, d, e, f]` mapping source pixels onto the target canvas.
pub fn pixel_matrix(
    transform: &SimilarityTransform,
    source_size: (u32, u32),
    target_size: (u32, u32),
) -> [f32; 6] {
    let m = transform.matrix();
    let (ws, hs) = (source_size.0.max(1) as f32, source_size.1.max(1) as f32);
    let (wt, ht) = (target_size.0 as f32, target_size.1 as f32);
    [
        wt * m[0][0] / ws,
        wt * m[0][1] / hs,
        wt * m[0][2],
        ht * m[1][0] / ws,
        ht * m[1][1] / hs,
        ht * m[1][2],
    ]
}

/// Apply a 2×3 affine warp to every channel of `source`, producing an
/// `out_width`×`out_height` buffer.
///
/// Uses bilinear interpolation at pixel centres. Out-of-bounds samples are 0.
pub fn warp_affine(
    source: &PixelBuffer,
    matrix: &[f32; 6],
    out_width: u32,
    out_height: u32,
) -> PixelBuffer {
    let channels = source.channels() as usize;
    let (src_w, src_h) = (source.width() as i32, source.height() as i32);
    let frame = source.data();
    let mut output = vec![0u8; out_width as usize * out_height as usize * channels];

    let [a, b, c, d, e, f] = *matrix;
    let det = a * e - b * d;
    if det.abs() >= 1e-12 {
        let inv_det = 1.0 / det;
        let (ia, ib, id, ie) = (e * inv_det, -b * inv_det, -d * inv_det, a * inv_det);

        for oy in 0..out_height as usize {
            for ox in 0..out_width as usize {
                // Map output pixel centre back to source: src = M⁻¹ · (dst − t)
                let dx = ox as f32 + 0.5 - c;
                let dy = oy as f32 + 0.5 - f;
                let sx = ia * dx + ib * dy - 0.5;
                let sy = id * dx + ie * dy - 0.5;

                let x0 = sx.floor() as i32;
                let y0 = sy.floor() as i32;
                let fx = sx - x0 as f32;
                let fy = sy - y0 as f32;

                let base = (oy * out_width as usize + ox) * channels;
                for ch in 0..channels {
                    let sample = |x: i32, y: i32| -> f32 {
                        if x >= 0 && x < src_w && y >= 0 && y < src_h {
                            frame[(y as usize * src_w as usize + x as usize) * channels + ch] as f32
                        } else {
                            0.0
                        }
                    };

                    let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                        + sample(x0 + 1, y0) * fx * (1.0 - fy)
                        + sample(x0, y0 + 1) * (1.0 - fx) * fy
                        + sample(x0 + 1, y0 + 1) * fx * fy;

                    output[base + ch] = val.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    PixelBuffer::new(out_width, out_height, source.channels(), output)
        .unwrap_or_else(|_| PixelBuffer::filled(out_width, out_height, [0, 0, 0]))
}

/// An alignment plus the source photo warped onto the target canvas.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub result: AlignmentResult,
    pub aligned_image: PixelBuffer,
}

/// Align `source_image` onto the geometry of a target whose landmarks are already known.
pub fn align_with_landmarks(
    source_image: &PixelBuffer,
    source_landmarks: &LandmarkSet,
    target_size: (u32, u32),
    target_landmarks: &LandmarkSet,
) -> Result<Alignment, PipelineError> {
    let (transform, result) = align_landmarks(source_landmarks, target_landmarks)?;
    let matrix = pixel_matrix(
        &transform,
        (source_image.width(), source_image.height()),
        target_size,
    );
    let aligned_image = warp_affine(source_image, &matrix, target_size.0, target_size.1);

    tracing::debug!(
        score = result.alignment_score,
        rotation = result.rotation_degrees,
        scale = result.scale,
        well_aligned = result.is_well_aligned(),
        "aligned photo to baseline"
    );

    Ok(Alignment {
        result,
        aligned_image,
    })
}

/// Aligner that obtains landmarks from a detector capability.
pub struct LandmarkAligner<D> {
    detector: D,
}

impl<D: LandmarkDetector> LandmarkAligner<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn into_detector(self) -> D {
        self.detector
    }

    fn landmarks(&mut self, image: &PixelBuffer) -> Result<LandmarkSet, PipelineError> {
        self.detector
            .detect(image)?
            .filter(|set| !set.is_empty())
            .ok_or(PipelineError::NoFaceDetected)
    }

    /// Warp `source` onto the geometry of `target`.
    pub fn align(
        &mut self,
        source: &PixelBuffer,
        target: &PixelBuffer,
    ) -> Result<Alignment, PipelineError> {
        let source_landmarks = self.landmarks(source)?;
        let target_landmarks = self.landmarks(target)?;
        align_with_landmarks(
            source,
            &source_landmarks,
            (target.width(), target.height()),
            &target_landmarks,
        )
    }

    /// Decode both photos, then [`align`](Self::align). Unreadable input is a `DecodeFailure`.
    pub fn align_encoded(
        &mut self,
        source: &[u8],
        target: &[u8],
    ) -> Result<Alignment, PipelineError> {
        let source = decode::decode_image(source)?;
        let target = decode::decode_image(target)?;
        self.align(&source, &target)
    }

    /// Align every image onto one baseline, extracting the baseline landmarks once.
    ///
    /// Fails on the first image without a detectable face.
    pub fn align_many(
        &mut self,
        baseline: &PixelBuffer,
        images: &[PixelBuffer],
    ) -> Result<Vec<Alignment>, PipelineError> {
        let baseline_landmarks = self.landmarks(baseline)?;
        let canvas = (baseline.width(), baseline.height());

        images
            .iter()
            .map(|image| {
                let landmarks = self.landmarks(image)?;
                align_with_landmarks(image, &landmarks, canvas, &baseline_landmarks)
            })
            .collect()
    }
}
