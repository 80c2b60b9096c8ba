use super::{Acquired, FrameSource};
use crate::frame::RawFrame;
use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Live camera source, one frame per poll.
pub struct WebcamSource {
    camera: Camera,
    device_index: u32,
}

impl WebcamSource {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam streaming at {}x{}",
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            device_index,
        })
    }
}

impl FrameSource for WebcamSource {
    fn next_frame(&mut self) -> Result<Acquired> {
        let buffer = self.camera.frame().context("Failed to capture frame")?;
        let timestamp = Utc::now();

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode camera frame")?;

        // Rebuild through the raw buffer so nokhwa's image version doesn't leak out
        let (width, height) = decoded.dimensions();
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .context("Camera frame buffer has the wrong size")?;

        Ok(Acquired::Frame(RawFrame::decoded(timestamp, image)))
    }

    fn describe(&self) -> String {
        format!("webcam {}", self.device_index)
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", err);
        }
    }
}
