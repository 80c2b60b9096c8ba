use crate::error::{MonitorError, Result};
use crate::frame::Frame;
use image::GrayImage;
use serde::Serialize;

/// Normalized amount of change between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangeScore {
    /// Fraction of compared pixels that changed, in [0, 1]
    pub magnitude: f64,
    pub changed_pixels: u64,
    pub compared_pixels: u64,
}

impl ChangeScore {
    pub const ZERO: ChangeScore = ChangeScore {
        magnitude: 0.0,
        changed_pixels: 0,
        compared_pixels: 0,
    };

    fn from_counts(changed_pixels: u64, compared_pixels: u64) -> Self {
        let magnitude = if compared_pixels == 0 {
            0.0
        } else {
            changed_pixels as f64 / compared_pixels as f64
        };
        Self {
            magnitude,
            changed_pixels,
            compared_pixels,
        }
    }
}

/// Counts pixels whose luma moved by more than a sensitivity threshold.
///
/// An optional region-of-interest mask restricts the comparison to pixels
/// where the mask is non-zero. The mask must have the canonical frame size.
#[derive(Debug, Clone)]
pub struct Differencer {
    pixel_threshold: u8,
    mask: Option<GrayImage>,
}

impl Differencer {
    pub fn new(pixel_threshold: u8) -> Self {
        Self {
            pixel_threshold,
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: GrayImage) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn compare(&self, a: &Frame, b: &Frame) -> Result<ChangeScore> {
        let _span = tracing::debug_span!("compare").entered();

        check_dimensions(a.dimensions(), b.dimensions())?;
        if let Some(mask) = &self.mask {
            check_dimensions(a.dimensions(), mask.dimensions())?;
        }

        let threshold = self.pixel_threshold;
        let pairs = a.pixels().as_raw().iter().zip(b.pixels().as_raw().iter());

        let (changed, compared) = match &self.mask {
            Some(mask) => pairs
                .zip(mask.as_raw().iter())
                .filter(|(_, m)| **m != 0)
                .fold((0u64, 0u64), |(changed, compared), ((&pa, &pb), _)| {
                    (changed + u64::from(pa.abs_diff(pb) > threshold), compared + 1)
                }),
            None => pairs.fold((0u64, 0u64), |(changed, compared), (&pa, &pb)| {
                (changed + u64::from(pa.abs_diff(pb) > threshold), compared + 1)
            }),
        };

        Ok(ChangeScore::from_counts(changed, compared))
    }
}

fn check_dimensions(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected != actual {
        return Err(MonitorError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
