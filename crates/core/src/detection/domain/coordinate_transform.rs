//! Pure geometry between detector space, viewport space and crop space.
//!
//! Nothing here holds state; every function is reproducible from its inputs.

use crate::shared::face_box::{CropRegion, DisplayFit, DisplayRect, FaceBox};

/// Largest centered rectangle with the image's aspect ratio that fits the
/// viewport. `None` when any dimension is not positive.
pub fn fit_to_viewport(
    img_w: f64,
    img_h: f64,
    viewport_w: f64,
    viewport_h: f64,
) -> Option<DisplayFit> {
    if img_w <= 0.0 || img_h <= 0.0 || viewport_w <= 0.0 || viewport_h <= 0.0 {
        return None;
    }

    let image_ratio = img_w / img_h;
    let viewport_ratio = viewport_w / viewport_h;

    let fit = if image_ratio > viewport_ratio {
        let height = viewport_w / image_ratio;
        DisplayFit {
            width: viewport_w,
            height,
            offset_x: 0.0,
            offset_y: (viewport_h - height) / 2.0,
        }
    } else {
        let width = viewport_h * image_ratio;
        DisplayFit {
            width,
            height: viewport_h,
            offset_x: (viewport_w - width) / 2.0,
            offset_y: 0.0,
        }
    };
    Some(fit)
}

/// Maps a face box into viewport coordinates.
///
/// Padding is applied in image space before scaling, so the visual margin
/// stays proportional to the image resolution. The result is clamped to the
/// fitted image area and never has negative extent.
pub fn to_display_rect(
    face: &FaceBox,
    fit: &DisplayFit,
    img_w: f64,
    img_h: f64,
    padding: f64,
) -> DisplayRect {
    if img_w <= 0.0 || img_h <= 0.0 {
        return DisplayRect {
            left: fit.offset_x,
            top: fit.offset_y,
            width: 0.0,
            height: 0.0,
        };
    }

    let scale_x = fit.width / img_w;
    let scale_y = fit.height / img_h;

    let left = (face.left - padding) * scale_x + fit.offset_x;
    let top = (face.top - padding) * scale_y + fit.offset_y;
    let right = left + (face.width + 2.0 * padding) * scale_x;
    let bottom = top + (face.height + 2.0 * padding) * scale_y;

    let (min_x, max_x) = (fit.offset_x, fit.offset_x + fit.width);
    let (min_y, max_y) = (fit.offset_y, fit.offset_y + fit.height);

    let x0 = clamp(left, min_x, max_x);
    let y0 = clamp(top, min_y, max_y);
    let x1 = clamp(right, min_x, max_x);
    let y1 = clamp(bottom, min_y, max_y);

    DisplayRect {
        left: x0,
        top: y0,
        width: (x1 - x0).max(0.0),
        height: (y1 - y0).max(0.0),
    }
}

/// The box with the greatest area; the first one wins a tie.
pub fn select_largest_face(boxes: &[FaceBox]) -> Option<FaceBox> {
    let mut best: Option<FaceBox> = None;
    for b in boxes {
        match best {
            Some(current) if b.area() <= current.area() => {}
            _ => best = Some(*b),
        }
    }
    best
}

/// Gate for submission: the padded display rectangle must be at least
/// `min_display_size` on both axes.
pub fn is_face_large_enough(
    face: &FaceBox,
    fit: &DisplayFit,
    img_w: f64,
    img_h: f64,
    padding: f64,
    min_display_size: f64,
) -> bool {
    let rect = to_display_rect(face, fit, img_w, img_h, padding);
    rect.width >= min_display_size && rect.height >= min_display_size
}

/// Maps a box into the horizontally mirrored image.
pub fn mirror_box(face: &FaceBox, img_w: f64) -> FaceBox {
    FaceBox {
        left: img_w - (face.left + face.width),
        ..*face
    }
}

/// Integer crop rectangle for `face` expanded by `margin`, clipped to the
/// image. `None` when nothing of the box remains inside the image.
pub fn crop_region(face: &FaceBox, margin: f64, img_w: u32, img_h: u32) -> Option<CropRegion> {
    let (iw, ih) = (img_w as f64, img_h as f64);

    let face_left = face.left.max(0.0);
    let face_top = face.top.max(0.0);
    let face_width = face.width.min(iw - face_left);
    let face_height = face.height.min(ih - face_top);

    let left = (face_left - margin).floor().max(0.0);
    let top = (face_top - margin).floor().max(0.0);
    let width = (iw - left).min((face_width + 2.0 * margin).floor());
    let height = (ih - top).min((face_height + 2.0 * margin).floor());

    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(CropRegion {
        left: left as u32,
        top: top as u32,
        width: width as u32,
        height: height as u32,
    })
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}
