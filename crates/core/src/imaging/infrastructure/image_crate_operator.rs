use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::imaging::domain::image_operator::{FlipAxis, ImageOperator};
use crate::shared::face_box::CropRegion;
use crate::shared::settings::OutputFormat;

/// [`ImageOperator`] backed by the pure-Rust `image` crate.
///
/// Flip and rotate keep the input's encoding; crops are encoded in the
/// configured output format.
pub struct ImageCrateOperator {
    crop_format: OutputFormat,
    quality: u8,
}

impl ImageCrateOperator {
    pub fn new(crop_format: OutputFormat, quality: u8) -> Self {
        Self {
            crop_format,
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for ImageCrateOperator {
    fn default() -> Self {
        Self::new(OutputFormat::Jpeg, 95)
    }
}

impl ImageOperator for ImageCrateOperator {
    fn flip(&self, bytes: &[u8], axis: FlipAxis) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = image::load_from_memory(bytes)?;
        let flipped = match axis {
            FlipAxis::Horizontal => img.fliph(),
            FlipAxis::Vertical => img.flipv(),
        };
        encode(&flipped, source_format(bytes), self.quality)
    }

    fn rotate(&self, bytes: &[u8], degrees: u32) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = image::load_from_memory(bytes)?;
        let rotated = match degrees % 360 {
            0 => img,
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            other => return Err(format!("Unsupported rotation: {other} degrees").into()),
        };
        encode(&rotated, source_format(bytes), self.quality)
    }

    fn crop(
        &self,
        bytes: &[u8],
        region: CropRegion,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = image::load_from_memory(bytes)?;
        if region.width == 0
            || region.height == 0
            || region.left + region.width > img.width()
            || region.top + region.height > img.height()
        {
            return Err(format!(
                "Crop area {region:?} exceeds image bounds {}x{}",
                img.width(),
                img.height()
            )
            .into());
        }
        let cropped = img.crop_imm(region.left, region.top, region.width, region.height);
        encode(&cropped, self.crop_format, self.quality)
    }

    fn compress(
        &self,
        bytes: &[u8],
        max_w: u32,
        max_h: u32,
        quality: u8,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = image::load_from_memory(bytes)?;
        let factor = scale_factor(img.width(), img.height(), max_w, max_h);
        let resized = if factor < 1.0 {
            let w = ((img.width() as f64 * factor) as u32).max(1);
            let h = ((img.height() as f64 * factor) as u32).max(1);
            img.resize_exact(w, h, FilterType::Triangle)
        } else {
            img
        };
        encode(&resized, OutputFormat::Jpeg, quality.clamp(1, 100))
    }

    fn apply_exif_orientation(
        &self,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        if orientation == Orientation::NoTransforms {
            return Ok(None);
        }
        let mut img = DynamicImage::from_decoder(decoder)?;
        img.apply_orientation(orientation);
        encode(&img, source_format(bytes), self.quality).map(Some)
    }
}

fn scale_factor(width: u32, height: u32, max_w: u32, max_h: u32) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    let fx = max_w as f64 / width as f64;
    let fy = max_h as f64 / height as f64;
    fx.min(fy).min(1.0)
}

fn source_format(bytes: &[u8]) -> OutputFormat {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => OutputFormat::Jpeg,
        Ok(ImageFormat::WebP) => OutputFormat::Webp,
        _ => OutputFormat::Png,
    }
}

fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&img.to_rgb8())?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        OutputFormat::Webp => {
            // The WebP encoder only accepts 8-bit RGB(A).
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
    }
    Ok(buf)
}
