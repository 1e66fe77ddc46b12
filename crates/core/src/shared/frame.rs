use std::path::{Path, PathBuf};

/// A captured (and possibly rotated) image on disk.
///
/// Owned by the scheduler for one detection cycle; the next capture
/// supersedes it. Pixel data stays on disk and is read on demand by the
/// stages that need it.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True for frames a detector or transform can work with.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}
