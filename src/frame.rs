//! Decoded snapshot frames.
//!
//! A `SnapshotFrame` is built once per inbound snapshot event and dropped when
//! that event's unit of work finishes. It keeps the encoded bytes (what the
//! inference service receives) next to the decoded RGB pixels (what crops and
//! perceptual descriptors are computed from).

use std::fmt;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops, DynamicImage, ImageFormat, RgbImage};

use crate::detect::DetectionBox;

/// Upper bound on a decoded base64 payload.
pub const MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;

pub struct SnapshotFrame {
    encoded: Vec<u8>,
    pixels: RgbImage,
}

// Pixel data is left out; a snapshot can run to megabytes.
impl fmt::Debug for SnapshotFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotFrame")
            .field("encoded_len", &self.encoded.len())
            .field("width", &self.pixels.width())
            .field("height", &self.pixels.height())
            .finish()
    }
}

impl SnapshotFrame {
    /// Decode a base64 snapshot payload into a frame.
    pub fn from_base64(payload: &str) -> Result<Self> {
        let encoded = STANDARD
            .decode(payload.trim())
            .context("snapshot payload is not valid base64")?;
        Self::from_encoded(encoded)
    }

    /// Decode already-unwrapped image bytes (JPEG or PNG).
    pub fn from_encoded(encoded: Vec<u8>) -> Result<Self> {
        if encoded.len() > MAX_SNAPSHOT_BYTES {
            return Err(anyhow!(
                "snapshot of {} bytes exceeds limit of {} bytes",
                encoded.len(),
                MAX_SNAPSHOT_BYTES
            ));
        }
        let pixels = image::load_from_memory(&encoded)
            .context("snapshot payload is not a decodable image")?
            .to_rgb8();
        Ok(Self { encoded, pixels })
    }

    /// Wrap decoded pixels, encoding them as PNG.
    pub fn from_pixels(pixels: RgbImage) -> Result<Self> {
        let encoded = encode_png(&pixels)?;
        Ok(Self { encoded, pixels })
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Crop the frame to a detection box.
    ///
    /// The box is clamped to the frame; a box lying completely outside the
    /// frame is an error rather than an empty crop.
    pub fn crop(&self, bbox: &DetectionBox) -> Result<RgbImage> {
        let x1 = bbox.x1.min(self.width());
        let y1 = bbox.y1.min(self.height());
        let x2 = bbox.x2.min(self.width());
        let y2 = bbox.y2.min(self.height());
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "box ({}, {}) - ({}, {}) lies outside {}x{} frame",
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2,
                self.width(),
                self.height()
            ));
        }
        Ok(imageops::crop_imm(&self.pixels, x1, y1, x2 - x1, y2 - y1).to_image())
    }
}

pub fn encode_png(pixels: &RgbImage) -> Result<Vec<u8>> {
    encode(pixels, ImageFormat::Png)
}

/// Encode pixels as JPEG and wrap them in base64 for event payloads.
pub fn encode_jpeg_base64(pixels: &RgbImage) -> Result<String> {
    let jpeg = encode(pixels, ImageFormat::Jpeg)?;
    Ok(STANDARD.encode(jpeg))
}

fn encode(pixels: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(pixels.clone())
        .write_to(&mut buf, format)
        .with_context(|| format!("encode {:?} image", format))?;
    Ok(buf.into_inner())
}
