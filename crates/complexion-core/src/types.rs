use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Landmark count produced by the face-mesh capability.
pub const CANONICAL_LANDMARK_COUNT: usize = 468;

// Perceptual luminance weights (ITU-R BT.601).
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Perceptual luminance of an RGB sample, in the same units as the input.
#[inline]
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    LUMA_R * r + LUMA_G * g + LUMA_B * b
}

/// An immutable interleaved 8-bit image (RGB or RGBA).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw interleaved samples. Channel count must be 3 or 4 and the
    /// sample count must match the dimensions exactly.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        if channels != 3 && channels != 4 {
            return Err(PipelineError::DecodeFailure(format!(
                "unsupported channel count {channels} (expected 3 or 4)"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(PipelineError::DecodeFailure(format!(
                "buffer holds {} samples, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A solid RGB image.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            channels: 3,
            data,
        }
    }

    /// Build an RGB image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            channels: 3,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGB samples of the pixel at (x, y); alpha is ignored.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let c = self.channels as usize;
        let i = (y as usize * self.width as usize + x as usize) * c;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Single-channel perceptual intensity, one value per pixel in row-major order.
    pub fn grayscale(&self) -> Vec<f32> {
        self.data
            .chunks_exact(self.channels as usize)
            .map(|px| luma(px[0] as f32, px[1] as f32, px[2] as f32))
            .collect()
    }
}

/// One face-mesh point. `x`/`y` are normalized to the image extent, `z` is relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered landmark list. Indices are positional (index 1 is the nose tip).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

/// Verdict of the quality gate for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub is_valid: bool,
    /// 0–100, starting at 100 and reduced by each failing check.
    pub score: u32,
    /// Hard failures. The report is valid iff this is empty.
    pub issues: Vec<String>,
    /// Soft failures; tolerated.
    pub warnings: Vec<String>,
    pub metrics: QualityMetrics,
}

impl QualityReport {
    /// Report for an image that could not be read at all.
    pub fn rejected(cause: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            score: 0,
            issues: vec![cause.into()],
            warnings: Vec::new(),
            metrics: QualityMetrics::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub resolution: ResolutionMetrics,
    pub lighting: LightingMetrics,
    pub sharpness: SharpnessMetrics,
    /// Present only when face presence was checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceRegionEstimate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetrics {
    pub width: u32,
    pub height: u32,
    pub megapixels: f64,
    pub aspect_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingMetrics {
    /// Histogram-weighted mean intensity (0–255).
    pub brightness: f64,
    /// Histogram-weighted standard deviation of intensity.
    pub contrast: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharpnessMetrics {
    pub laplacian_variance: f64,
}

/// Output of a face-region estimator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRegionEstimate {
    pub face_detected: bool,
    /// Fraction of sampled pixels classified as skin (0–1).
    pub skin_fraction: f64,
    /// Estimated face area as a percentage of the whole image.
    pub estimated_area_percent: f64,
}

/// Translation component of an alignment, in normalized image units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub x: f32,
    pub y: f32,
}

/// Similarity transform between a photo and its baseline, with quality scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    /// Row-major 3×3 affine matrix in normalized landmark coordinates.
    pub transform: [[f32; 3]; 3],
    /// 0–1, derived from key-point residuals after the transform.
    pub alignment_score: f32,
    /// 0–1, blends the alignment score with landmark completeness.
    pub confidence: f32,
    pub rotation_degrees: f32,
    pub scale: f32,
    pub translation: Translation,
    pub source_landmark_count: usize,
    pub target_landmark_count: usize,
}

impl AlignmentResult {
    pub fn is_well_aligned(&self) -> bool {
        crate::alignment::is_well_aligned(self.alignment_score)
    }
}

/// The eight skin-condition metrics, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Wrinkles,
    Spots,
    Texture,
    Pores,
    Evenness,
    Firmness,
    Radiance,
    Hydration,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::Wrinkles,
        MetricKind::Spots,
        MetricKind::Texture,
        MetricKind::Pores,
        MetricKind::Evenness,
        MetricKind::Firmness,
        MetricKind::Radiance,
        MetricKind::Hydration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Wrinkles => "wrinkles",
            MetricKind::Spots => "spots",
            MetricKind::Texture => "texture",
            MetricKind::Pores => "pores",
            MetricKind::Evenness => "evenness",
            MetricKind::Firmness => "firmness",
            MetricKind::Radiance => "radiance",
            MetricKind::Hydration => "hydration",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Grade::A
        } else if score >= 70 {
            Grade::B
        } else if score >= 60 {
            Grade::C
        } else if score >= 50 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricScore {
    pub score: u8,
    pub grade: Grade,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Raised for each metric scoring below the acceptability threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub severity: Severity,
    pub confidence: f32,
}

/// Per-request skin analysis report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinMetrics {
    pub wrinkles: MetricScore,
    pub spots: MetricScore,
    pub texture: MetricScore,
    pub pores: MetricScore,
    pub evenness: MetricScore,
    pub firmness: MetricScore,
    pub radiance: MetricScore,
    pub hydration: MetricScore,
    /// Rounded mean of the eight scores.
    pub overall_score: u8,
    pub concerns: Vec<Concern>,
    pub recommendations: Vec<String>,
    pub processing_time_ms: f64,
}

impl SkinMetrics {
    pub fn metric(&self, kind: MetricKind) -> &MetricScore {
        match kind {
            MetricKind::Wrinkles => &self.wrinkles,
            MetricKind::Spots => &self.spots,
            MetricKind::Texture => &self.texture,
            MetricKind::Pores => &self.pores,
            MetricKind::Evenness => &self.evenness,
            MetricKind::Firmness => &self.firmness,
            MetricKind::Radiance => &self.radiance,
            MetricKind::Hydration => &self.hydration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_rejects_bad_channels() {
        let result = PixelBuffer::new(2, 2, 1, vec![0; 4]);
        assert!(matches!(result, Err(PipelineError::DecodeFailure(_))));
    }

    #[test]
    fn test_pixel_buffer_rejects_short_data() {
        let result = PixelBuffer::new(2, 2, 3, vec![0; 11]);
        assert!(matches!(result, Err(PipelineError::DecodeFailure(_))));
    }

    #[test]
    fn test_rgb_ignores_alpha() {
        let buf = PixelBuffer::new(2, 1, 4, vec![1, 2, 3, 255, 4, 5, 6, 0]).unwrap();
        assert_eq!(buf.rgb(1, 0), [4, 5, 6]);
    }

    #[test]
    fn test_grayscale_of_white_is_255() {
        let buf = PixelBuffer::filled(3, 3, [255, 255, 255]);
        assert!(buf.grayscale().iter().all(|&v| (v - 255.0).abs() < 1e-3));
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(Grade::from_score(100), Grade::A);
        assert_eq!(Grade::from_score(80), Grade::A);
        assert_eq!(Grade::from_score(79), Grade::B);
        assert_eq!(Grade::from_score(60), Grade::C);
        assert_eq!(Grade::from_score(50), Grade::D);
        assert_eq!(Grade::from_score(49), Grade::F);
        assert_eq!(Grade::from_score(0), Grade::F);
    }

    #[test]
    fn test_landmark_set_is_a_plain_json_array() {
        let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.25, 0.0)]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"x":0.5,"y":0.25,"z":0.0}]"#);
    }

    #[test]
    fn test_landmark_z_defaults_when_missing() {
        let set: LandmarkSet = serde_json::from_str(r#"[{"x":0.1,"y":0.2}]"#).unwrap();
        assert_eq!(set.get(0), Some(&Landmark::new(0.1, 0.2, 0.0)));
    }

    #[test]
    fn test_concern_serializes_kind_as_type() {
        let concern = Concern {
            kind: MetricKind::Pores,
            severity: Severity::Medium,
            confidence: 0.6,
        };
        let value = serde_json::to_value(&concern).unwrap();
        assert_eq!(value["type"], "pores");
        assert_eq!(value["severity"], "medium");
    }
}
