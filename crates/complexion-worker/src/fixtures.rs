//! Shared test inputs.

use base64::Engine as _;
use complexion_core::{AnalysisPipeline, Landmark, LandmarkSet, QualityConfig, TensorRuntime};
use std::io::Cursor;

/// Pipeline whose gate accepts small uniform images.
pub fn relaxed_pipeline() -> AnalysisPipeline {
    let config = QualityConfig {
        min_width: 16,
        min_height: 16,
        min_megapixels: 0.0,
        min_contrast: 0.0,
        min_sharpness: 0.0,
        require_face: false,
        ..QualityConfig::default()
    };
    AnalysisPipeline::new(config, TensorRuntime::new(32))
}

/// Mid-gray square PNG as a data URL.
pub fn png_data_url(size: u32) -> String {
    let img = image::RgbImage::from_pixel(size, size, image::Rgb([128, 128, 128]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
    )
}

pub fn landmarks() -> LandmarkSet {
    vec![Landmark::new(0.5, 0.5, 0.0); 468].into()
}
