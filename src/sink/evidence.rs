use super::EventSink;
use crate::alert::{Event, EventKind};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

const JPEG_QUALITY: u8 = 95;

/// Saves the frame behind each Alert as a JPEG snapshot.
pub struct EvidenceSink {
    dir: PathBuf,
}

impl EvidenceSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create evidence directory {}", dir.display()))?;

        tracing::info!("Saving alert evidence to {}", dir.display());
        Ok(Self { dir })
    }

    /// Create a new file named after the event time, numbering alerts that
    /// share a millisecond instead of overwriting.
    fn create_file(&self, event: &Event) -> Result<(PathBuf, File)> {
        let stamp = event.timestamp.format("%Y%m%dT%H%M%S%.3fZ");
        let mut suffix = 0u32;
        loop {
            let name = match suffix {
                0 => format!("alert-{stamp}.jpg"),
                n => format!("alert-{stamp}-{n}.jpg"),
            };
            let path = self.dir.join(name);
            match File::options().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        }
    }
}

impl EventSink for EvidenceSink {
    fn emit(&mut self, event: &Event) -> Result<()> {
        if event.kind != EventKind::Alert {
            return Ok(());
        }
        let Some(frame) = &event.frame else {
            tracing::debug!("Alert at {} carries no frame", event.timestamp);
            return Ok(());
        };

        let (path, file) = self.create_file(event)?;
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
        frame
            .pixels()
            .write_with_encoder(encoder)
            .with_context(|| format!("Failed to encode {}", path.display()))?;

        tracing::info!("Saved evidence {}", path.display());
        Ok(())
    }
}
