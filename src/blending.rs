//! Alpha blending math for overlay removal.
//!
//! The overlay is applied via forward alpha blending against pure white:
//! `observed = alpha * 255 + (1 - alpha) * original`
//!
//! This module provides the reverse operation to recover original pixels,
//! and the forward operation it inverts.

use image::RgbaImage;

use crate::alpha_maps::AlphaMask;

/// Alpha threshold: ignore pixels with negligible overlay effect (noise).
pub const ALPHA_THRESHOLD: f32 = 0.002;

/// Maximum alpha: clamp to avoid division by near-zero in reverse blending.
pub const MAX_ALPHA: f32 = 0.99;

/// Channel value of the overlay graphic (pure white).
pub const OVERLAY_VALUE: f32 = 255.0;

/// Forward model: the observed value of `original` under coverage `alpha`.
#[must_use]
pub fn blend_value(original: u8, alpha: f32) -> f32 {
    alpha * OVERLAY_VALUE + (1.0 - alpha) * f32::from(original)
}

/// Reverse model: recover the original value from an `observed` one.
///
/// `alpha` is clamped to [`MAX_ALPHA`]; the result is rounded and clamped to `[0, 255]`.
#[must_use]
pub fn unblend_value(observed: f32, alpha: f32) -> u8 {
    let alpha = alpha.min(MAX_ALPHA);
    let original = (observed - alpha * OVERLAY_VALUE) / (1.0 - alpha);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        original.round().clamp(0.0, 255.0) as u8
    }
}

/// Visit every pixel of the mask footprint at `(pos_x, pos_y)` that lies inside
/// the image and carries more than [`ALPHA_THRESHOLD`] coverage.
fn for_each_covered(
    image: &mut RgbaImage,
    mask: &AlphaMask,
    pos_x: u32,
    pos_y: u32,
    mut f: impl FnMut(&mut image::Rgba<u8>, f32),
) {
    let (img_w, img_h) = image.dimensions();

    for row in 0..mask.height() {
        for col in 0..mask.width() {
            let (Some(ax), Some(ay)) = (pos_x.checked_add(col), pos_y.checked_add(row)) else {
                continue;
            };
            if ax >= img_w || ay >= img_h {
                continue;
            }
            let Some(alpha) = mask.get(col, row) else {
                continue;
            };
            if alpha <= ALPHA_THRESHOLD {
                continue;
            }
            f(image.get_pixel_mut(ax, ay), alpha);
        }
    }
}

/// Remove the white overlay from an image using reverse alpha blending.
///
/// Applies `original = (observed - alpha * 255) / (1 - alpha)` to the RGB
/// channels of every covered pixel, in place. The alpha channel is untouched.
///
/// Returns the number of pixels that were rewritten.
pub fn remove_overlay_region(
    image: &mut RgbaImage,
    mask: &AlphaMask,
    pos_x: u32,
    pos_y: u32,
) -> usize {
    let mut touched = 0;
    for_each_covered(image, mask, pos_x, pos_y, |px, alpha| {
        for ch in 0..3 {
            px[ch] = unblend_value(f32::from(px[ch]), alpha);
        }
        touched += 1;
    });
    touched
}

/// Composite the white overlay onto an image with forward alpha blending.
///
/// The exact counterpart of [`remove_overlay_region`]: same footprint, same
/// threshold, values rounded to the nearest integer.
pub fn apply_overlay_region(image: &mut RgbaImage, mask: &AlphaMask, pos_x: u32, pos_y: u32) {
    for_each_covered(image, mask, pos_x, pos_y, |px, alpha| {
        for ch in 0..3 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                px[ch] = blend_value(px[ch], alpha).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
}
