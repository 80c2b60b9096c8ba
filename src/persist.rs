use crate::error::{MonitorError, Result};
use crate::frame::Frame;
use chrono::{DateTime, Utc};
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Keeps the baseline on disk as a luma PNG so it survives restarts.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a stored baseline of the expected canonical size.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored frame was
    /// written for a different target size.
    pub fn load(&self, expected: (u32, u32)) -> Result<Option<Frame>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let pixels = image::open(&self.path)
            .map_err(|err| {
                MonitorError::Decode(format!("{}: {}", self.path.display(), err))
            })?
            .into_luma8();

        if pixels.dimensions() != expected {
            tracing::warn!(
                "Ignoring stored baseline {}: size {:?} does not match target {:?}",
                self.path.display(),
                pixels.dimensions(),
                expected
            );
            return Ok(None);
        }

        let stored_at: DateTime<Utc> = std::fs::metadata(&self.path)?.modified()?.into();
        tracing::info!(
            "Loaded baseline from {} (stored {})",
            self.path.display(),
            stored_at
        );
        Ok(Some(Frame::new(stored_at, pixels)))
    }

    pub fn save(&self, frame: &Frame) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("png.tmp");
        frame
            .pixels()
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(|err| match err {
                image::ImageError::IoError(io) => MonitorError::Io(io),
                other => MonitorError::Io(std::io::Error::other(other)),
            })?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!("Saved baseline to {}", self.path.display());
        Ok(())
    }
}
