use super::{has_image_extension, Acquired, FrameSource};
use crate::frame::RawFrame;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Polls a directory that other processes drop images into.
///
/// Each poll yields the oldest image not seen yet. When every file has been
/// seen, the most recent readable one is yielded again so the monitor keeps
/// comparing the latest known scene. Files that fail to decode are skipped
/// from then on until they are rewritten.
pub struct DirectorySource {
    dir: PathBuf,
    seen: HashSet<OsString>,
    /// Undecodable files and the modification time they had when tried
    rejected: HashMap<OsString, SystemTime>,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        tracing::info!("Watching image directory {}", dir.display());
        Ok(Self {
            dir,
            seen: HashSet::new(),
            rejected: HashMap::new(),
        })
    }

    /// Image files ordered oldest first, ties broken by name.
    fn list_images(&self) -> Result<Vec<(SystemTime, PathBuf)>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            images.push((modified, path));
        }
        images.sort();
        Ok(images)
    }

    /// Forget files that are no longer in the directory.
    fn prune(&mut self, images: &[(SystemTime, PathBuf)]) {
        let present: HashSet<&OsStr> = images
            .iter()
            .filter_map(|(_, path)| path.file_name())
            .collect();
        self.seen.retain(|name| present.contains(name.as_os_str()));
        self.rejected.retain(|name, _| present.contains(name.as_os_str()));
    }

    fn is_rejected(&self, name: &OsStr, modified: SystemTime) -> bool {
        self.rejected.get(name) == Some(&modified)
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Acquired> {
        let images = self.list_images()?;
        self.prune(&images);

        let candidates = images.iter().filter_map(|(modified, path)| {
            let name = path.file_name()?;
            (!self.is_rejected(name, *modified)).then_some((*modified, path, name))
        });
        let next_unseen = candidates
            .clone()
            .find(|(_, _, name)| !self.seen.contains(*name));

        let (modified, path, name) = match next_unseen.or_else(|| candidates.last()) {
            Some((modified, path, name)) => (modified, path.clone(), name.to_os_string()),
            None if images.is_empty() => bail!("No images in {}", self.dir.display()),
            None => bail!("No readable images in {}", self.dir.display()),
        };

        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;

        match image::load_from_memory(&bytes) {
            Ok(image) => {
                if self.seen.insert(name) {
                    tracing::debug!("New image {}", path.display());
                }
                Ok(Acquired::Frame(RawFrame::decoded(Utc::now(), image)))
            }
            Err(err) => {
                tracing::warn!("Ignoring undecodable image {}", path.display());
                self.rejected.insert(name, modified);
                Err(err).with_context(|| format!("Failed to decode {}", path.display()))
            }
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}
