//! Photo quality gate.
//!
//! Runs cheap statistical checks (resolution, lighting histogram, Laplacian
//! sharpness, skin-region presence) before any expensive analysis. Each failing
//! check deducts a fixed weight from a starting score of 100. The gate never
//! returns an error: decode failures become a rejected report.

use crate::decode;
use crate::types::{
    FaceRegionEstimate, LightingMetrics, PixelBuffer, QualityMetrics, QualityReport,
    ResolutionMetrics, SharpnessMetrics,
};
use serde::{Deserialize, Serialize};

const START_SCORE: u32 = 100;

const PENALTY_RESOLUTION: u32 = 30;
const PENALTY_MEGAPIXELS: u32 = 10;
const PENALTY_ASPECT_RATIO: u32 = 5;
const PENALTY_BRIGHTNESS: u32 = 25;
const PENALTY_BRIGHTNESS_MARGIN: u32 = 5;
const PENALTY_CONTRAST: u32 = 10;
const PENALTY_BLUR: u32 = 30;
const PENALTY_SOFT_FOCUS: u32 = 5;
const PENALTY_NO_FACE: u32 = 35;
const PENALTY_SMALL_FACE: u32 = 15;

/// Brightness within this many units of either bound draws a warning.
const BRIGHTNESS_MARGIN: f64 = 20.0;
/// Sharpness below `min_sharpness * SOFT_FOCUS_FACTOR` draws a warning.
const SOFT_FOCUS_FACTOR: f64 = 1.5;

/// Thresholds for the quality gate. Missing fields in a TOML table fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub min_megapixels: f64,
    /// Upper bound for `max(w, h) / min(w, h)`.
    pub max_aspect_ratio: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_contrast: f64,
    /// Minimum Laplacian variance.
    pub min_sharpness: f64,
    pub require_face: bool,
    /// Minimum estimated face area, as a percentage of the image.
    pub min_face_size_percent: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 512,
            min_height: 512,
            min_megapixels: 0.5,
            max_aspect_ratio: 2.0,
            min_brightness: 50.0,
            max_brightness: 220.0,
            min_contrast: 25.0,
            min_sharpness: 100.0,
            require_face: true,
            min_face_size_percent: 15.0,
        }
    }
}

/// Settings file layout: gate thresholds live under a `[quality]` table.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    quality: QualityConfig,
}

impl QualityConfig {
    /// Parse the `[quality]` table of a TOML settings file. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let settings: SettingsFile = toml::from_str(text)?;
        Ok(settings.quality)
    }
}

/// Capability that decides whether a face is plausibly present.
pub trait FaceRegionEstimator {
    fn estimate(&self, buffer: &PixelBuffer) -> FaceRegionEstimate;
}

/// Fixed-range skin-colour sampler over the central window of the image.
///
/// Not a face detector: it only counts skin-coloured pixels. Swap in a real
/// detector by implementing [`FaceRegionEstimator`].
#[derive(Debug, Clone)]
pub struct HeuristicSkinRegionSampler {
    /// Fraction of width and height covered by the centred window.
    pub window_fraction: f64,
    /// Sample every `stride`-th pixel along each axis.
    pub stride: u32,
    /// Skin fraction above which a face is considered present.
    pub min_skin_fraction: f64,
}

impl Default for HeuristicSkinRegionSampler {
    fn default() -> Self {
        Self {
            window_fraction: 0.5,
            stride: 5,
            min_skin_fraction: 0.2,
        }
    }
}

impl HeuristicSkinRegionSampler {
    /// RGB skin rule for uniform daylight illumination.
    pub fn is_skin([r, g, b]: [u8; 3]) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        r > 95 && g > 40 && b > 20 && max - min > 15 && r.abs_diff(g) > 15 && r > g && r > b
    }
}

impl FaceRegionEstimator for HeuristicSkinRegionSampler {
    fn estimate(&self, buffer: &PixelBuffer) -> FaceRegionEstimate {
        let (w, h) = (buffer.width(), buffer.height());
        let stride = self.stride.max(1);
        let margin = (1.0 - self.window_fraction.clamp(0.0, 1.0)) / 2.0;
        let x0 = (w as f64 * margin) as u32;
        let y0 = (h as f64 * margin) as u32;
        let x1 = w - x0;
        let y1 = h - y0;

        let mut sampled = 0u64;
        let mut skin = 0u64;
        for y in (y0..y1).step_by(stride as usize) {
            for x in (x0..x1).step_by(stride as usize) {
                sampled += 1;
                if Self::is_skin(buffer.rgb(x, y)) {
                    skin += 1;
                }
            }
        }

        if sampled == 0 {
            return FaceRegionEstimate::default();
        }

        let skin_fraction = skin as f64 / sampled as f64;
        let estimated_pixels = skin as f64 * (stride as f64 * stride as f64);
        let estimated_area_percent =
            (estimated_pixels / buffer.pixel_count() as f64 * 100.0).min(100.0);

        FaceRegionEstimate {
            face_detected: skin_fraction > self.min_skin_fraction,
            skin_fraction,
            estimated_area_percent,
        }
    }
}

/// Running score with ordered issue and warning lists.
struct Verdict {
    score: u32,
    issues: Vec<String>,
    warnings: Vec<String>,
}

impl Verdict {
    fn new() -> Self {
        Self {
            score: START_SCORE,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn issue(&mut self, message: String, penalty: u32) {
        self.issues.push(message);
        self.score = self.score.saturating_sub(penalty);
    }

    fn warn(&mut self, message: String, penalty: u32) {
        self.warnings.push(message);
        self.score = self.score.saturating_sub(penalty);
    }
}

/// Quality gate with a pluggable face-region estimator.
pub struct QualityGate<E = HeuristicSkinRegionSampler> {
    config: QualityConfig,
    estimator: E,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self::with_estimator(config, HeuristicSkinRegionSampler::default())
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl<E: FaceRegionEstimator> QualityGate<E> {
    pub fn with_estimator(config: QualityConfig, estimator: E) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Run every check against a decoded buffer.
    pub fn validate(&self, buffer: &PixelBuffer) -> QualityReport {
        let cfg = &self.config;
        let mut verdict = Verdict::new();

        let resolution = check_resolution(buffer, cfg, &mut verdict);

        let gray = buffer.grayscale();
        let lighting = check_lighting(&gray, cfg, &mut verdict);
        let sharpness = check_sharpness(
            &gray,
            buffer.width() as usize,
            buffer.height() as usize,
            cfg,
            &mut verdict,
        );
        drop(gray);

        let face = self.estimator.estimate(buffer);
        if !face.face_detected {
            if cfg.require_face {
                verdict.issue(
                    "No face detected in the center of the photo".into(),
                    PENALTY_NO_FACE,
                );
            }
        } else if face.estimated_area_percent < cfg.min_face_size_percent {
            verdict.warn(
                format!(
                    "Face appears small ({:.1}% of the photo, recommended at least {:.0}%)",
                    face.estimated_area_percent, cfg.min_face_size_percent
                ),
                PENALTY_SMALL_FACE,
            );
        }

        let report = QualityReport {
            is_valid: verdict.issues.is_empty(),
            score: verdict.score.min(START_SCORE),
            issues: verdict.issues,
            warnings: verdict.warnings,
            metrics: QualityMetrics {
                resolution,
                lighting,
                sharpness,
                face: Some(face),
            },
        };

        tracing::debug!(
            score = report.score,
            valid = report.is_valid,
            issues = report.issues.len(),
            warnings = report.warnings.len(),
            "quality gate verdict"
        );

        report
    }

    /// Decode and validate. Unreadable input yields a rejected report.
    pub fn validate_encoded(&self, bytes: &[u8]) -> QualityReport {
        match decode::decode_image(bytes) {
            Ok(buffer) => self.validate(&buffer),
            Err(e) => {
                tracing::debug!(error = %e, "quality gate could not decode image");
                QualityReport::rejected(format!("Failed to read image: {e}"))
            }
        }
    }

    /// Same as [`validate_encoded`](Self::validate_encoded) for data-URL input.
    pub fn validate_data_url(&self, encoded: &str) -> QualityReport {
        match decode::decode_data_url(encoded) {
            Ok(buffer) => self.validate(&buffer),
            Err(e) => QualityReport::rejected(format!("Failed to read image: {e}")),
        }
    }

    /// Resolution and aspect-ratio checks only.
    pub fn quick_validate(&self, buffer: &PixelBuffer) -> bool {
        quick_validate_dimensions(buffer.width(), buffer.height(), &self.config)
    }
}

/// Validate `buffer` against `config` with the default skin-region sampler.
pub fn validate(buffer: &PixelBuffer, config: &QualityConfig) -> QualityReport {
    QualityGate::new(config.clone()).validate(buffer)
}

/// Fast early rejection on dimensions alone, with default thresholds.
pub fn quick_validate(buffer: &PixelBuffer) -> bool {
    quick_validate_dimensions(buffer.width(), buffer.height(), &QualityConfig::default())
}

/// False when the image is below the minimum dimensions or exceeds the
/// maximum aspect ratio. Usable before the image is fully decoded.
pub fn quick_validate_dimensions(width: u32, height: u32, config: &QualityConfig) -> bool {
    if width < config.min_width || height < config.min_height {
        return false;
    }
    aspect_ratio(width, height) <= config.max_aspect_ratio
}

fn aspect_ratio(width: u32, height: u32) -> f64 {
    let long = width.max(height) as f64;
    let short = width.min(height).max(1) as f64;
    long / short
}

fn check_resolution(
    buffer: &PixelBuffer,
    cfg: &QualityConfig,
    verdict: &mut Verdict,
) -> ResolutionMetrics {
    let (width, height) = (buffer.width(), buffer.height());
    let megapixels = width as f64 * height as f64 / 1_000_000.0;
    let ratio = aspect_ratio(width, height);

    if width < cfg.min_width || height < cfg.min_height {
        verdict.issue(
            format!(
                "Resolution {width}x{height} is below the minimum of {}x{}",
                cfg.min_width, cfg.min_height
            ),
            PENALTY_RESOLUTION,
        );
    } else if megapixels < cfg.min_megapixels {
        verdict.warn(
            format!(
                "Low resolution ({megapixels:.2} MP, recommended at least {:.1} MP)",
                cfg.min_megapixels
            ),
            PENALTY_MEGAPIXELS,
        );
    }

    if ratio > cfg.max_aspect_ratio {
        verdict.warn(
            format!("Unusual aspect ratio {ratio:.2}:1, a portrait crop works best"),
            PENALTY_ASPECT_RATIO,
        );
    }

    ResolutionMetrics {
        width,
        height,
        megapixels,
        aspect_ratio: ratio,
    }
}

/// 256-bin intensity histogram.
pub fn histogram(gray: &[f32]) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for &v in gray {
        hist[v.round().clamp(0.0, 255.0) as usize] += 1;
    }
    hist
}

/// Histogram-weighted mean and standard deviation.
pub fn histogram_stats(hist: &[u64; 256]) -> (f64, f64) {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return (0.0, 0.0);
    }
    let n = total as f64;
    let mean = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum::<f64>()
        / n;
    let variance = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| c as f64 * (i as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

fn check_lighting(gray: &[f32], cfg: &QualityConfig, verdict: &mut Verdict) -> LightingMetrics {
    let (brightness, contrast) = histogram_stats(&histogram(gray));

    if brightness < cfg.min_brightness {
        verdict.issue(
            format!(
                "Photo is too dark (brightness {brightness:.0}, minimum {:.0})",
                cfg.min_brightness
            ),
            PENALTY_BRIGHTNESS,
        );
    } else if brightness > cfg.max_brightness {
        verdict.issue(
            format!(
                "Photo is overexposed (brightness {brightness:.0}, maximum {:.0})",
                cfg.max_brightness
            ),
            PENALTY_BRIGHTNESS,
        );
    } else if brightness < cfg.min_brightness + BRIGHTNESS_MARGIN
        || brightness > cfg.max_brightness - BRIGHTNESS_MARGIN
    {
        verdict.warn(
            format!("Lighting is borderline (brightness {brightness:.0})"),
            PENALTY_BRIGHTNESS_MARGIN,
        );
    }

    if contrast < cfg.min_contrast {
        verdict.warn(
            format!(
                "Low contrast ({contrast:.1}, recommended at least {:.0})",
                cfg.min_contrast
            ),
            PENALTY_CONTRAST,
        );
    }

    LightingMetrics {
        brightness,
        contrast,
    }
}

/// Variance of the absolute 4-neighbour Laplacian response over interior pixels.
pub fn laplacian_variance(gray: &[f32], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 || gray.len() < width * height {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..height - 1 {
        let row = y * width;
        for x in 1..width - 1 {
            let i = row + x;
            let response =
                gray[i - 1] + gray[i + 1] + gray[i - width] + gray[i + width] - 4.0 * gray[i];
            let magnitude = response.abs() as f64;
            sum += magnitude;
            sum_sq += magnitude * magnitude;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn check_sharpness(
    gray: &[f32],
    width: usize,
    height: usize,
    cfg: &QualityConfig,
    verdict: &mut Verdict,
) -> SharpnessMetrics {
    let laplacian_variance = laplacian_variance(gray, width, height);

    if laplacian_variance < cfg.min_sharpness {
        verdict.issue(
            format!(
                "Photo is blurry (sharpness {laplacian_variance:.1}, minimum {:.0})",
                cfg.min_sharpness
            ),
            PENALTY_BLUR,
        );
    } else if laplacian_variance < cfg.min_sharpness * SOFT_FOCUS_FACTOR {
        verdict.warn(
            format!("Photo is slightly soft (sharpness {laplacian_variance:.1})"),
            PENALTY_SOFT_FOCUS,
        );
    }

    SharpnessMetrics { laplacian_variance }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: [u8; 3] = [200, 140, 110];
    const BACKDROP: [u8; 3] = [128, 128, 128];

    /// Deterministic noise in [-amp, amp].
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, amp: i32) -> i32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) % (2 * amp as u64 + 1)) as i32 - amp
        }
    }

    fn jitter(rgb: [u8; 3], n: i32) -> [u8; 3] {
        rgb.map(|c| (c as i32 + n).clamp(0, 255) as u8)
    }

    /// Noisy backdrop with a centred skin-toned disc.
    fn portrait(size: u32, disc_fraction: f64) -> PixelBuffer {
        let mut rng = Lcg(7);
        let c = size as f64 / 2.0;
        let r = size as f64 * disc_fraction;
        PixelBuffer::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as f64 - c, y as f64 - c);
            let base = if dx * dx + dy * dy <= r * r { SKIN } else { BACKDROP };
            jitter(base, rng.next(15))
        })
    }

    #[test]
    fn test_well_lit_sharp_portrait_passes() {
        let report = validate(&portrait(640, 0.3), &QualityConfig::default());
        assert!(report.is_valid, "issues: {:?}", report.issues);
        assert!(report.issues.is_empty());
        assert!(report.metrics.face.as_ref().unwrap().face_detected);
    }

    #[test]
    fn test_small_image_fails_resolution() {
        let report = validate(&portrait(256, 0.3), &QualityConfig::default());
        assert!(!report.is_valid);
        assert!(report.issues[0].contains("Resolution"));
        assert!(report.score <= 70);
    }

    #[test]
    fn test_valid_iff_no_issues() {
        let images = [
            PixelBuffer::filled(64, 64, [0, 0, 0]),
            PixelBuffer::filled(600, 600, [128, 128, 128]),
            portrait(600, 0.3),
            portrait(600, 0.05),
        ];
        for img in &images {
            let report = validate(img, &QualityConfig::default());
            assert_eq!(report.is_valid, report.issues.is_empty());
            assert!(report.score <= 100);
        }
    }

    #[test]
    fn test_black_image_is_too_dark_and_blurry() {
        let report = validate(&PixelBuffer::filled(600, 600, [0, 0, 0]), &QualityConfig::default());
        assert!(!report.is_valid);
        assert!(report.issues.iter().any(|i| i.contains("too dark")));
        assert!(report.issues.iter().any(|i| i.contains("blurry")));
        assert!(report.issues.iter().any(|i| i.contains("No face")));
        // Penalties exceed 100; the score saturates.
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_white_image_is_overexposed() {
        let cfg = QualityConfig {
            require_face: false,
            ..Default::default()
        };
        let report = validate(&PixelBuffer::filled(600, 600, [255, 255, 255]), &cfg);
        assert!(report.issues.iter().any(|i| i.contains("overexposed")));
        assert!(!report.metrics.face.unwrap().face_detected);
        assert!(!report.issues.iter().any(|i| i.contains("No face")));
    }

    #[test]
    fn test_each_failing_check_lowers_score() {
        let img = portrait(640, 0.3);
        let base = relaxed_base();
        let base_score = validate(&img, &base).score;
        assert_eq!(base_score, 100);

        let tightened = [
            QualityConfig { min_width: 1000, ..base.clone() },
            QualityConfig { min_megapixels: 2.0, ..base.clone() },
            QualityConfig { max_aspect_ratio: 0.5, ..base.clone() },
            QualityConfig { min_brightness: 200.0, ..base.clone() },
            QualityConfig { max_brightness: 100.0, ..base.clone() },
            QualityConfig { min_contrast: 200.0, ..base.clone() },
            QualityConfig { min_sharpness: 1.0e6, ..base.clone() },
            QualityConfig { min_face_size_percent: 90.0, ..base.clone() },
        ];
        for cfg in tightened {
            let score = validate(&img, &cfg).score;
            assert!(score < base_score, "{cfg:?}: {score} !< {base_score}");
        }
    }

    fn relaxed_base() -> QualityConfig {
        QualityConfig {
            min_megapixels: 0.3,
            min_contrast: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_borderline_brightness_warns() {
        let img = portrait(640, 0.3);
        let brightness = validate(&img, &relaxed_base()).metrics.lighting.brightness;

        for cfg in [
            QualityConfig {
                min_brightness: brightness - 10.0,
                ..relaxed_base()
            },
            QualityConfig {
                max_brightness: brightness + 10.0,
                ..relaxed_base()
            },
        ] {
            let report = validate(&img, &cfg);
            assert!(report.is_valid, "issues: {:?}", report.issues);
            assert_eq!(report.score, 95);
            assert!(
                report.warnings.iter().any(|w| w.contains("borderline")),
                "{:?}",
                report.warnings
            );
        }
    }

    #[test]
    fn test_soft_focus_warns() {
        let img = portrait(640, 0.3);
        let variance = validate(&img, &relaxed_base()).metrics.sharpness.laplacian_variance;

        let cfg = QualityConfig {
            min_sharpness: variance / 1.2,
            ..relaxed_base()
        };
        let report = validate(&img, &cfg);
        assert!(report.is_valid, "issues: {:?}", report.issues);
        assert_eq!(report.score, 95);
        assert!(
            report.warnings.iter().any(|w| w.contains("slightly soft")),
            "{:?}",
            report.warnings
        );
    }

    #[test]
    fn test_small_face_warns_even_when_face_optional() {
        let img = portrait(640, 0.3);
        for require_face in [true, false] {
            let cfg = QualityConfig {
                require_face,
                min_face_size_percent: 90.0,
                ..relaxed_base()
            };
            let report = validate(&img, &cfg);
            assert!(report.is_valid, "issues: {:?}", report.issues);
            assert_eq!(report.score, 85);
            assert!(report.warnings.iter().any(|w| w.contains("Face appears small")));
            assert!(report.metrics.face.as_ref().unwrap().face_detected);
        }
    }

    #[test]
    fn test_quick_validate_dimensions() {
        assert!(!quick_validate(&PixelBuffer::filled(511, 1024, [0, 0, 0])));
        assert!(!quick_validate(&PixelBuffer::filled(1024, 511, [0, 0, 0])));
        assert!(quick_validate(&PixelBuffer::filled(512, 512, [0, 0, 0])));
        // 3:1 exceeds the default 2:1 aspect ratio.
        assert!(!quick_validate_dimensions(1536, 512, &QualityConfig::default()));
    }

    #[test]
    fn test_laplacian_variance_flat_is_zero() {
        let gray = vec![100.0f32; 50 * 50];
        assert_eq!(laplacian_variance(&gray, 50, 50), 0.0);
    }

    #[test]
    fn test_laplacian_variance_noise_beats_blur() {
        let mut rng = Lcg(1);
        let noisy: Vec<f32> = (0..64 * 64).map(|_| 128.0 + rng.next(20) as f32).collect();
        // Box-blur the same noise.
        let mut blurred = noisy.clone();
        for y in 1..63 {
            for x in 1..63 {
                let i = y * 64 + x;
                blurred[i] =
                    (noisy[i - 1] + noisy[i] + noisy[i + 1] + noisy[i - 64] + noisy[i + 64]) / 5.0;
            }
        }
        assert!(laplacian_variance(&noisy, 64, 64) > laplacian_variance(&blurred, 64, 64) * 3.0);
    }

    #[test]
    fn test_laplacian_variance_tiny_image() {
        assert_eq!(laplacian_variance(&[1.0, 2.0, 3.0, 4.0], 2, 2), 0.0);
    }

    #[test]
    fn test_histogram_stats_two_levels() {
        let mut hist = [0u64; 256];
        hist[100] = 50;
        hist[200] = 50;
        let (mean, std) = histogram_stats(&hist);
        assert!((mean - 150.0).abs() < 1e-9);
        assert!((std - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_skin_rule() {
        assert!(HeuristicSkinRegionSampler::is_skin(SKIN));
        assert!(!HeuristicSkinRegionSampler::is_skin(BACKDROP));
        assert!(!HeuristicSkinRegionSampler::is_skin([40, 90, 200]));
    }

    #[test]
    fn test_sampler_estimates_area() {
        let img = PixelBuffer::from_fn(500, 500, |x, y| {
            if (125..375).contains(&x) && (125..375).contains(&y) { SKIN } else { BACKDROP }
        });
        let est = HeuristicSkinRegionSampler::default().estimate(&img);
        assert!(est.face_detected);
        assert!((est.skin_fraction - 1.0).abs() < 1e-9);
        // The 250x250 window is a quarter of the image.
        assert!((est.estimated_area_percent - 25.0).abs() < 1.0, "{}", est.estimated_area_percent);
    }

    #[test]
    fn test_missing_face_is_an_issue_only_when_required() {
        let img = portrait(640, 0.0);
        let required = validate(&img, &QualityConfig::default());
        assert!(required.issues.iter().any(|i| i.contains("No face")));

        let optional = validate(&img, &QualityConfig { require_face: false, ..Default::default() });
        assert!(!optional.issues.iter().any(|i| i.contains("No face")));
    }

    #[test]
    fn test_custom_estimator_is_used() {
        struct AlwaysFace;
        impl FaceRegionEstimator for AlwaysFace {
            fn estimate(&self, _: &PixelBuffer) -> FaceRegionEstimate {
                FaceRegionEstimate {
                    face_detected: true,
                    skin_fraction: 1.0,
                    estimated_area_percent: 50.0,
                }
            }
        }
        let gate = QualityGate::with_estimator(QualityConfig::default(), AlwaysFace);
        let report = gate.validate(&portrait(640, 0.0));
        assert!(report.metrics.face.unwrap().face_detected);
    }

    #[test]
    fn test_undecodable_bytes_become_rejected_report() {
        let report = QualityGate::default().validate_encoded(b"\x89PNG garbage");
        assert!(!report.is_valid);
        assert_eq!(report.score, 0);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn test_partial_toml_config_keeps_defaults() {
        let cfg: QualityConfig = toml::from_str("min_width = 800\nrequire_face = false").unwrap();
        assert_eq!(cfg.min_width, 800);
        assert!(!cfg.require_face);
        assert_eq!(cfg.min_height, QualityConfig::default().min_height);
    }

    #[test]
    fn test_settings_file_quality_table() {
        let cfg =
            QualityConfig::from_toml("[quality]\nmin_width = 640\nmin_contrast = 30\n").unwrap();
        assert_eq!(cfg.min_width, 640);
        assert_eq!(cfg.min_contrast, 30.0);
        assert!(cfg.require_face);

        assert_eq!(QualityConfig::from_toml("").unwrap(), QualityConfig::default());
        assert!(QualityConfig::from_toml("[quality]\nmin_width = \"wide\"").is_err());
    }
}
