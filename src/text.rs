//! Text watermark rendering.
//!
//! Text is rasterized with `ab_glyph` into a transparent RGBA image whose
//! alpha channel carries glyph coverage. Fonts are always supplied by the
//! caller; nothing is embedded.

use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{Rgb, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Load a TrueType / OpenType font file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read and [`Error::Font`] if it is not a font.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes).map_err(|e| Error::Font(format!("{}: {e}", path.display())))
}

/// Parse a hex color string (`#RGB` or `#RRGGBB`).
///
/// # Errors
///
/// Returns [`Error::Settings`] for anything else.
pub fn parse_hex_color(hex: &str) -> Result<Rgb<u8>> {
    let digits = hex
        .strip_prefix('#')
        .ok_or_else(|| Error::Settings(format!("color must start with '#', got '{hex}'")))?;

    let channel = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| Error::Settings(format!("invalid hex digit in color '{hex}'")))
    };

    if !digits.is_ascii() {
        return Err(Error::Settings(format!("invalid hex digit in color '{hex}'")));
    }

    match digits.len() {
        // #RGB: each digit doubled, 0xA -> 0xAA
        3 => Ok(Rgb([
            channel(&digits[0..1])? * 17,
            channel(&digits[1..2])? * 17,
            channel(&digits[2..3])? * 17,
        ])),
        6 => Ok(Rgb([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ])),
        n => Err(Error::Settings(format!(
            "color must be #RGB or #RRGGBB, got {n} digits"
        ))),
    }
}

/// Advance width of `text` at `font_size`, including kerning.
#[must_use]
pub fn measure_text(font: &FontArc, text: &str, font_size: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(font_size));
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }

    width
}

/// Rasterize `text` in `color` onto a transparent canvas.
///
/// The canvas is as wide as the advance width and at least `font_size` tall;
/// the glyph box is centered vertically.
#[must_use]
pub fn render_text(font: &FontArc, text: &str, font_size: f32, color: Rgb<u8>) -> RgbaImage {
    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);

    let ascent = scaled.ascent();
    let descent = scaled.descent();
    let width = measure_text(font, text, font_size);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (canvas_w, canvas_h) = (
        width.ceil().max(1.0) as u32,
        font_size.max(ascent - descent).ceil().max(1.0) as u32,
    );
    let mut image = RgbaImage::new(canvas_w, canvas_h);

    #[allow(clippy::cast_precision_loss)]
    let baseline_y = canvas_h as f32 / 2.0 + (ascent + descent) / 2.0;
    let mut cursor_x = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            cursor_x += scaled.kern(prev, id);
        }

        let glyph = id.with_scale_and_position(scale, point(cursor_x, baseline_y));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let (x, y) = (
                    gx as i32 + bounds.min.x as i32,
                    gy as i32 + bounds.min.y as i32,
                );
                let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
                    return;
                };
                if x >= canvas_w || y >= canvas_h {
                    return;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                let px = image.get_pixel_mut(x, y);
                // overlapping glyph edges keep the stronger coverage
                if alpha > px[3] {
                    *px = Rgba([color[0], color[1], color[2], alpha]);
                }
            });
        }

        cursor_x += scaled.h_advance(id);
        prev = Some(id);
    }

    image
}
