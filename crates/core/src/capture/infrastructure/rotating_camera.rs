use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::domain::camera::Camera;
use crate::imaging::domain::image_operator::{encoded_extension, ImageOperator};
use crate::shared::frame::Frame;
use crate::storage::domain::file_storage::FileStorage;

/// How captured frames are turned upright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// Follow each frame's EXIF orientation tag.
    Exif,
    /// Rotate clockwise by a fixed angle, ignoring EXIF.
    Fixed(u32),
}

/// Decorator that turns every captured frame upright.
///
/// The rotated image is written to a scratch file which is overwritten on
/// each capture. If rotation fails the unrotated frame is passed through.
pub struct RotatingCamera<C: Camera> {
    inner: C,
    rotation: Rotation,
    operator: Arc<dyn ImageOperator>,
    storage: Arc<dyn FileStorage>,
    scratch_dir: PathBuf,
}

impl<C: Camera> RotatingCamera<C> {
    pub fn new(
        inner: C,
        rotation: Rotation,
        operator: Arc<dyn ImageOperator>,
        storage: Arc<dyn FileStorage>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        let rotation = match rotation {
            Rotation::Fixed(degrees) => Rotation::Fixed(degrees % 360),
            Rotation::Exif => Rotation::Exif,
        };
        Self {
            inner,
            rotation,
            operator,
            storage,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// `Ok(None)` when the frame is already upright.
    fn rotate(&self, frame: &Frame) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let bytes = self.storage.read_file(frame.path())?;
        let (rotated, width, height) = match self.rotation {
            Rotation::Fixed(degrees) => {
                let rotated = self.operator.rotate(&bytes, degrees)?;
                let (width, height) = if degrees == 90 || degrees == 270 {
                    (frame.height(), frame.width())
                } else {
                    (frame.width(), frame.height())
                };
                (rotated, width, height)
            }
            Rotation::Exif => {
                let Some(rotated) = self.operator.apply_exif_orientation(&bytes)? else {
                    return Ok(None);
                };
                let (width, height) = image::ImageReader::new(Cursor::new(&rotated))
                    .with_guessed_format()?
                    .into_dimensions()?;
                (rotated, width, height)
            }
        };

        let path = self
            .scratch_dir
            .join(format!("rotated_frame.{}", encoded_extension(&rotated)));
        self.storage.write_file(&path, &rotated)?;
        Ok(Some(Frame::new(path, width, height)))
    }
}

impl<C: Camera> Camera for RotatingCamera<C> {
    fn capture(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let frame = self.inner.capture()?;
        if self.rotation == Rotation::Fixed(0) {
            return Ok(frame);
        }
        match self.rotate(&frame) {
            Ok(Some(rotated)) => Ok(rotated),
            Ok(None) => Ok(frame),
            Err(e) => {
                log::warn!("Rotation ({:?}) failed, using unrotated frame: {e}", self.rotation);
                Ok(frame)
            }
        }
    }
}
