//! Reading frames from image files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use itertools::Itertools;

use crate::{
    image::{self, Image},
    video::FrameSource,
};

/// Replays a list of image files as a video.
///
/// Frames are read lazily, one file per [`FrameSource::read`] call.
#[derive(Debug)]
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageSequence {
    /// Creates a sequence from a single image file, or from all supported images (`jpg`, `jpeg` and
    /// `png`) in a directory, in lexical order of their file names.
    ///
    /// Fails if `path` does not exist, or if it is a directory without any supported images.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::open_impl(path.as_ref())
    }

    fn open_impl(path: &Path) -> anyhow::Result<Self> {
        let meta = fs::metadata(path)
            .with_context(|| format!("failed to access '{}'", path.display()))?;
        if !meta.is_dir() {
            return Ok(Self::from_paths(vec![path.to_path_buf()]));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(path)
            .with_context(|| format!("failed to read directory '{}'", path.display()))?
        {
            let entry_path = entry?.path();
            if entry_path.is_file() && image::is_supported_path(&entry_path) {
                paths.push(entry_path);
            }
        }
        if paths.is_empty() {
            anyhow::bail!("no JPEG or PNG images found in '{}'", path.display());
        }

        log::debug!("found {} images in '{}'", paths.len(), path.display());
        Ok(Self::from_paths(paths.into_iter().sorted().collect()))
    }

    /// Creates a sequence that reads the given files in order.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }

    /// Returns the number of frames that have not been read yet.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        match self.paths.next() {
            Some(path) => {
                log::trace!("reading frame '{}'", path.display());
                Image::load(&path).map(Some)
            }
            None => Ok(None),
        }
    }
}
