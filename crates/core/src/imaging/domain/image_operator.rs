use crate::shared::face_box::CropRegion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Bitmap operators on encoded image bytes.
///
/// Every call decodes, transforms and re-encodes, and each may fail
/// independently. Callers decide which failures have a fallback.
pub trait ImageOperator: Send + Sync {
    fn flip(&self, bytes: &[u8], axis: FlipAxis) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Clockwise rotation by 0, 90, 180 or 270 degrees.
    fn rotate(&self, bytes: &[u8], degrees: u32) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    fn crop(&self, bytes: &[u8], region: CropRegion)
        -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Downscales to fit within `max_w` × `max_h` (never upscales) and
    /// re-encodes as JPEG at `quality`.
    fn compress(
        &self,
        bytes: &[u8],
        max_w: u32,
        max_h: u32,
        quality: u8,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Re-encodes `bytes` upright according to their EXIF orientation tag.
    /// `Ok(None)` when the image carries no tag or is already upright.
    fn apply_exif_orientation(
        &self,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>>;
}

/// File extension matching the encoding of `bytes`, `jpg` when unknown.
pub fn encoded_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg")
}
