use crate::error::{MonitorError, Result};
use crate::frame::{Frame, RawFrame, RawImage};
use image::{imageops, DynamicImage};

/// Converts raw frames into canonical luma frames of a fixed size.
///
/// Steps:
/// 1. Decode (when the source handed over encoded bytes)
/// 2. Convert to 8-bit luma
/// 3. Resize to the target size with the bilinear `Triangle` filter
/// 4. Optionally apply a Gaussian blur to suppress sensor noise
///
/// The same input always produces the same frame.
#[derive(Debug, Clone)]
pub struct Normalizer {
    target_width: u32,
    target_height: u32,
    blur_sigma: Option<f32>,
}

impl Normalizer {
    pub fn new(target_width: u32, target_height: u32, blur_sigma: Option<f32>) -> Self {
        Self {
            target_width,
            target_height,
            blur_sigma,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn normalize(&self, raw: RawFrame) -> Result<Frame> {
        let _span = tracing::debug_span!("normalize").entered();

        let decoded = match raw.image {
            RawImage::Decoded(image) => image,
            RawImage::Encoded(bytes) => decode(&bytes)?,
        };

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(MonitorError::Decode(format!(
                "image has zero area ({width}x{height})"
            )));
        }

        let luma = decoded.into_luma8();
        let resized = if luma.dimensions() != self.target_size() {
            imageops::resize(
                &luma,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            luma
        };

        let pixels = match self.blur_sigma {
            Some(sigma) => imageops::blur(&resized, sigma),
            None => resized,
        };

        Ok(Frame::new(raw.timestamp, pixels))
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(MonitorError::Decode("empty image buffer".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}
