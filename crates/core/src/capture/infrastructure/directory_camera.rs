use std::path::{Path, PathBuf};

use crate::capture::domain::camera::Camera;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays the image files of a directory as camera frames.
///
/// Files are served in name order and the sequence wraps around, so a
/// small directory behaves like a camera pointed at a looping scene.
pub struct DirectoryCamera {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    pub fn open(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| format!("Cannot read frame directory {}: {e}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        if files.is_empty() {
            return Err(format!("No image files in {}", dir.display()).into());
        }
        files.sort();
        log::info!("Replaying {} frames from {}", files.len(), dir.display());
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Camera for DirectoryCamera {
    fn capture(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let path = self.files[self.next].clone();
        self.next = (self.next + 1) % self.files.len();
        let (width, height) = image::image_dimensions(&path)?;
        Ok(Frame::new(path, width, height))
    }
}
