//! Image decoding, channel normalization and model input tensors

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use anyhow::{Context, Result};

use crate::utils::math::standardize;

/// Standard input size for face detection (SCRFD)
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);

/// Standard input size for FaceNet
pub const EMBEDDER_INPUT_SIZE: (u32, u32) = (160, 160);

/// Decode image bytes (JPEG, PNG, ...) and apply EXIF orientation
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data).context("Failed to decode image")?;
    Ok(apply_exif_orientation(data, image))
}

/// Convert any decoded raster into the canonical 3-channel RGB8 image.
///
/// Grayscale is replicated across channels, alpha is dropped, RGB8 input is
/// moved through without touching pixel values. No resizing or scaling.
pub fn normalize(image: DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    }
}

/// Phone cameras store rotation in EXIF instead of rotating pixels
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    let orientation = exif::Reader::new()
        .read_from_container(&mut std::io::Cursor::new(data))
        .ok()
        .and_then(|exif_data| {
            exif_data
                .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1);

    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Letterbox mapping between the detector canvas and the source image
pub struct ResizeInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ResizeInfo {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let (orig_w, orig_h) = original;
        let (target_w, target_h) = target;

        let scale = f32::min(
            target_w as f32 / orig_w as f32,
            target_h as f32 / orig_h as f32,
        );
        let new_w = ((orig_w as f32 * scale) as u32).min(target_w);
        let new_h = ((orig_h as f32 * scale) as u32).min(target_h);

        Self {
            scale,
            offset_x: (target_w - new_w) / 2,
            offset_y: (target_h - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Scaled (width, height) of the image on the canvas
    pub fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.original_width as f32 * self.scale) as u32).max(1),
            ((self.original_height as f32 * self.scale) as u32).max(1),
        )
    }

    /// Map canvas coordinates back to the source image, clamped to its bounds
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (
            x.clamp(0.0, self.original_width as f32),
            y.clamp(0.0, self.original_height as f32),
        )
    }
}

/// Build the SCRFD input: letterboxed to 640x640, BGR, NCHW, (v - 127.5) / 128
pub fn detector_input(image: &RgbImage) -> (Array4<f32>, ResizeInfo) {
    let (target_w, target_h) = DETECTOR_INPUT_SIZE;
    let info = ResizeInfo::new(image.dimensions(), DETECTOR_INPUT_SIZE);
    let (new_w, new_h) = info.scaled_size();

    let resized = image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    // Padding is black (0), which normalizes to -127.5 / 128
    tensor.fill(-127.5 / 128.0);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (cx, cy) = ((x + info.offset_x) as usize, (y + info.offset_y) as usize);
        if cx >= target_w as usize || cy >= target_h as usize {
            continue;
        }
        let [r, g, b] = pixel.0;
        tensor[[0, 0, cy, cx]] = (b as f32 - 127.5) / 128.0;
        tensor[[0, 1, cy, cx]] = (g as f32 - 127.5) / 128.0;
        tensor[[0, 2, cy, cx]] = (r as f32 - 127.5) / 128.0;
    }

    (tensor, info)
}

/// Crop a face box with a fractional margin, clamped to the image
pub fn crop_face(
    image: &RgbImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    margin: f32,
) -> Option<RgbImage> {
    let (img_w, img_h) = image.dimensions();

    let margin_x = (x2 - x1) * margin;
    let margin_y = (y2 - y1) * margin;

    let left = (x1 - margin_x).max(0.0) as u32;
    let top = (y1 - margin_y).max(0.0) as u32;
    let right = ((x2 + margin_x).min(img_w as f32) as u32).min(img_w);
    let bottom = ((y2 + margin_y).min(img_h as f32) as u32).min(img_h);

    if right <= left || bottom <= top {
        return None;
    }

    Some(image::imageops::crop_imm(image, left, top, right - left, bottom - top).to_image())
}

/// Build the FaceNet input: 160x160, RGB, NHWC, prewhitened per image
pub fn embedder_input(face: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = EMBEDDER_INPUT_SIZE;
    let resized: ImageBuffer<Rgb<u8>, Vec<u8>> =
        image::imageops::resize(face, w, h, image::imageops::FilterType::Lanczos3);

    let mut values: Vec<f32> = resized.as_raw().iter().map(|v| *v as f32).collect();
    standardize(&mut values);

    // as_raw() is row-major RGB, i.e. already HWC
    Array4::from_shape_vec((1, h as usize, w as usize, 3), values)
        .context("Failed to shape embedder input")
}

/// Dimensions helper for logging
pub fn describe(image: &DynamicImage) -> String {
    let (w, h) = image.dimensions();
    format!("{}x{} {:?}", w, h, image.color())
}
