//! Face thumbnail rendering.
//!
//! When a new person is minted, the face region is cropped out of the
//! original image, scaled down, and uploaded to the object store as a
//! JPEG so callers have something to show next to the identity.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;

use crate::db::BoundingBox;

const JPEG_QUALITY: u8 = 85;

/// Crop the face out of the decoded image and render a thumbnail no
/// larger than `max_size` on either side. The bounding box is clamped
/// to the image bounds; detectors occasionally report boxes that hang
/// over the edge. Decoding is the caller's job so one photo is decoded
/// once however many persons it mints.
pub fn render_face_thumbnail(
    img: &DynamicImage,
    bbox: &BoundingBox,
    max_size: u32,
) -> Result<Vec<u8>> {
    let (width, height) = (img.width(), img.height());
    let left = bbox.left.clamp(0, width.saturating_sub(1) as i32) as u32;
    let top = bbox.top.clamp(0, height.saturating_sub(1) as i32) as u32;
    let right = bbox.right.clamp(left as i32 + 1, width as i32) as u32;
    let bottom = bbox.bottom.clamp(top as i32 + 1, height as i32) as u32;

    let face = img.crop_imm(left, top, right - left, bottom - top);
    let thumbnail = face.thumbnail(max_size, max_size);

    let mut bytes = Vec::new();
    thumbnail
        .write_with_encoder(JpegEncoder::new_with_quality(
            Cursor::new(&mut bytes),
            JPEG_QUALITY,
        ))
        .context("failed to encode thumbnail")?;
    Ok(bytes)
}
