//! Deterministic image normalization: any decodable source image becomes a
//! channel-first `(3, side, side)` u8 tensor.
//!
//! The smaller dimension is resized to exactly `side` (aspect preserved,
//! Lanczos3), then the larger dimension is center-cropped with
//! integer-truncated symmetric excess removal. An image whose dimensions
//! already match is only converted to RGB.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("cannot decode {}: {}", .path.display(), .source)]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub fn load_and_normalize(path: &Path, side: u32) -> Result<Vec<u8>, NormalizeError> {
    let img = image::open(path).map_err(|source| NormalizeError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize_image(&img, side))
}

pub fn normalize_image(img: &DynamicImage, side: u32) -> Vec<u8> {
    let rgb = img.to_rgb8();
    let resized = resize_smaller_to(&rgb, side);
    let (w, h) = resized.dimensions();
    let cropped = if w != side {
        let excess = (w - side) / 2;
        imageops::crop_imm(&resized, excess, 0, side, side).to_image()
    } else if h != side {
        let excess = (h - side) / 2;
        imageops::crop_imm(&resized, 0, excess, side, side).to_image()
    } else {
        resized
    };
    channel_first(&cropped)
}

fn resize_smaller_to(rgb: &RgbImage, side: u32) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let (nw, nh) = if w <= h {
        (side, scale_larger_dim(h, w, side))
    } else {
        (scale_larger_dim(w, h, side), side)
    };
    if (nw, nh) == (w, h) {
        rgb.clone()
    } else {
        imageops::resize(rgb, nw, nh, FilterType::Lanczos3)
    }
}

/// Scales `larger` by `side / smaller`, rounding half up. The result never
/// drops below `side`, so the subsequent crop window always fits.
fn scale_larger_dim(larger: u32, smaller: u32, side: u32) -> u32 {
    let scaled =
        (u64::from(larger) * u64::from(side) + u64::from(smaller) / 2) / u64::from(smaller);
    u32::try_from(scaled.max(u64::from(side))).unwrap_or(u32::MAX)
}

fn channel_first(rgb: &RgbImage) -> Vec<u8> {
    let (w, h) = rgb.dimensions();
    let plane = w as usize * h as usize;
    let mut out = vec![0u8; 3 * plane];
    for (x, y, px) in rgb.enumerate_pixels() {
        let idx = y as usize * w as usize + x as usize;
        out[idx] = px[0];
        out[plane + idx] = px[1];
        out[2 * plane + idx] = px[2];
    }
    out
}
