//! Image decode adapter: encoded bytes or data URLs into `PixelBuffer`s.

use crate::error::PipelineError;
use crate::types::PixelBuffer;
use base64::Engine;

/// Decode any format supported by the `image` crate.
///
/// Images with an alpha channel decode to RGBA, everything else
/// (including grayscale and 16-bit inputs) to RGB8.
pub fn decode_image(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::DecodeFailure("empty image payload".into()));
    }
    let img = image::load_from_memory(bytes)?;

    if img.color().has_alpha() {
        let rgba = img.into_rgba8();
        let (width, height) = rgba.dimensions();
        PixelBuffer::new(width, height, 4, rgba.into_raw())
    } else {
        let rgb = img.into_rgb8();
        let (width, height) = rgb.dimensions();
        PixelBuffer::new(width, height, 3, rgb.into_raw())
    }
}

/// Decode a `data:<mime>;base64,<payload>` string, or a bare base64 payload.
pub fn decode_data_url(encoded: &str) -> Result<PixelBuffer, PipelineError> {
    let payload = match encoded.trim().strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or_else(|| {
                PipelineError::DecodeFailure("data URL has no payload separator".into())
            })?;
            if !meta.ends_with(";base64") {
                return Err(PipelineError::DecodeFailure(format!(
                    "unsupported data URL encoding: {meta}"
                )));
            }
            data
        }
        None => encoded.trim(),
    };

    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    decode_image(&bytes)
}

/// Convert a buffer back into an `image` RGB image (alpha dropped), e.g. to save aligned output.
pub fn to_rgb_image(buffer: &PixelBuffer) -> Result<image::RgbImage, PipelineError> {
    let data = if buffer.channels() == 3 {
        buffer.data().to_vec()
    } else {
        buffer
            .data()
            .chunks_exact(buffer.channels() as usize)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    };
    image::RgbImage::from_raw(buffer.width(), buffer.height(), data).ok_or_else(|| {
        PipelineError::AnalysisFailed("pixel buffer does not match its dimensions".into())
    })
}
