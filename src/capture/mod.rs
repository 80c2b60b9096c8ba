mod directory;
mod file;
mod memory;
#[cfg(feature = "webcam")]
mod webcam;

pub use directory::DirectorySource;
pub use file::FileSource;
pub use memory::MemorySource;
#[cfg(feature = "webcam")]
pub use webcam::WebcamSource;

use crate::frame::RawFrame;
use anyhow::Result;

/// Extensions the filesystem sources treat as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff", "bmp", "gif"];

/// Outcome of a successful pull from a source.
#[derive(Debug)]
pub enum Acquired {
    Frame(RawFrame),
    /// The source has nothing more to give; the monitor stops cleanly
    EndOfStream,
}

/// Trait for frame sources
///
/// `next_frame` may block until a frame is available. An `Err` is a
/// transient acquisition failure: the monitor skips the cycle and tries
/// again on the next tick.
pub trait FrameSource {
    /// Pull the next raw frame
    fn next_frame(&mut self) -> Result<Acquired>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Acquired> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

fn has_image_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
