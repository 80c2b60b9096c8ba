use super::{Acquired, FrameSource};
use crate::frame::RawFrame;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Re-reads a single image file on every poll.
///
/// Suits cameras and scripts that keep overwriting one snapshot file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!("Watching image file {}", path.display());
        Self { path }
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Acquired> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        Ok(Acquired::Frame(RawFrame::encoded(Utc::now(), bytes)))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawImage;
    use image::{GrayImage, Luma};

    #[test]
    fn reads_file_contents_each_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        GrayImage::from_pixel(4, 4, Luma([9])).save(&path).unwrap();
        let expected = std::fs::read(&path).unwrap();

        let mut source = FileSource::new(&path);
        for _ in 0..2 {
            match source.next_frame().unwrap() {
                Acquired::Frame(RawFrame {
                    image: RawImage::Encoded(bytes),
                    ..
                }) => assert_eq!(bytes, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileSource::new(dir.path().join("absent.jpg"));

        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains("absent.jpg"));
    }
}
