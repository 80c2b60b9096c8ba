use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage};
use std::sync::Arc;

/// Image payload as handed over by a frame source.
#[derive(Debug, Clone)]
pub enum RawImage {
    /// Already decoded pixels (camera buffers, synthetic frames)
    Decoded(DynamicImage),
    /// Encoded file contents; the format is sniffed on decode
    Encoded(Vec<u8>),
}

/// One acquired, not yet normalized, sample.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: DateTime<Utc>,
    pub image: RawImage,
}

impl RawFrame {
    pub fn decoded(timestamp: DateTime<Utc>, image: impl Into<DynamicImage>) -> Self {
        Self {
            timestamp,
            image: RawImage::Decoded(image.into()),
        }
    }

    pub fn encoded(timestamp: DateTime<Utc>, bytes: Vec<u8>) -> Self {
        Self {
            timestamp,
            image: RawImage::Encoded(bytes),
        }
    }
}

/// A canonical luma frame, immutable once built.
///
/// Pixels sit behind an `Arc`, so cloning a frame to keep it as baseline or
/// attach it to an event shares the buffer instead of copying it.
#[derive(Debug, Clone)]
pub struct Frame {
    timestamp: DateTime<Utc>,
    pixels: Arc<GrayImage>,
}

impl Frame {
    pub fn new(timestamp: DateTime<Utc>, pixels: GrayImage) -> Self {
        Self {
            timestamp,
            pixels: Arc::new(pixels),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }
}
