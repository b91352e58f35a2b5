//! Watermark compositor.
//!
//! Draws a [`WatermarkSpec`] onto an RGBA image, either as a single copy
//! rotated about its anchor or as a rotated repeating pattern.
//!
//! Blending is the straight-alpha "over" operator:
//! `out = fg * fg_alpha + bg * bg_alpha * (1 - fg_alpha)`, normalized by the output alpha.

use ab_glyph::FontArc;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::settings::{Placement, TextStyle, TileStyle, WatermarkKind, WatermarkSpec};
use crate::text;

/// Color of the dashed placement guide drawn in previews.
const GUIDE_COLOR: Rgba<u8> = Rgba([92, 200, 255, 163]);
/// Guide dash pattern: pixels on, pixels off.
const GUIDE_DASH: (u32, u32) = (6, 4);
/// Longest side of any intermediate canvas (content or tile cell).
pub const MAX_CANVAS_SIDE: u32 = 16_384;

/// Decoded resources a watermark may need.
#[derive(Clone, Default)]
pub struct WatermarkAssets {
    /// Font for text watermarks.
    pub font: Option<FontArc>,
    /// Decoded logo for logo watermarks.
    pub logo: Option<RgbaImage>,
}

impl WatermarkAssets {
    /// Load the font or logo referenced by `spec`.
    ///
    /// Only the resource for `spec.kind` is loaded; an unset path leaves it empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] or [`Error::Io`] for an unreadable font, and
    /// [`Error::Decode`] for a logo that cannot be decoded.
    pub fn load(spec: &WatermarkSpec) -> Result<Self> {
        let mut assets = Self::default();
        match spec.kind {
            WatermarkKind::Text => {
                if let Some(path) = &spec.text.font {
                    assets.font = Some(text::load_font(path)?);
                }
            }
            WatermarkKind::Logo => {
                if let Some(path) = &spec.logo.path {
                    let logo = image::open(path).map_err(Error::Decode)?;
                    assets.logo = Some(logo.to_rgba8());
                }
            }
            WatermarkKind::None => {}
        }
        Ok(assets)
    }

    /// Use `font` for text watermarks.
    #[must_use]
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Use `logo` for logo watermarks.
    #[must_use]
    pub fn with_logo(mut self, logo: RgbaImage) -> Self {
        self.logo = Some(logo);
        self
    }
}

impl std::fmt::Debug for WatermarkAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkAssets")
            .field("font", &self.font.is_some())
            .field("logo", &self.logo.as_ref().map(RgbaImage::dimensions))
            .finish()
    }
}

/// Rendered watermark content and its layout size.
#[derive(Debug, Clone)]
pub struct Content {
    /// Pixels to draw, centered on the placement point.
    pub image: RgbaImage,
    /// Layout width used for tile cells and the guide.
    pub width: f32,
    /// Layout height used for tile cells and the guide.
    pub height: f32,
}

impl Content {
    /// Rasterize a text payload. Returns `None` for empty text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the color is malformed or the text would
    /// not fit in [`MAX_CANVAS_SIDE`].
    pub fn text(font: &FontArc, style: &TextStyle) -> Result<Option<Self>> {
        if style.content.is_empty() {
            return Ok(None);
        }
        let color = text::parse_hex_color(&style.color)?;
        let width = text::measure_text(font, &style.content, style.font_size);
        canvas_size("text", width, style.font_size * 2.0)?;
        Ok(Some(Self {
            image: text::render_text(font, &style.content, style.font_size, color),
            width,
            height: style.font_size,
        }))
    }

    /// Scale a logo uniformly by `scale`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the scaled logo would not fit in [`MAX_CANVAS_SIDE`].
    pub fn logo(logo: &RgbaImage, scale: f32) -> Result<Self> {
        #[allow(clippy::cast_precision_loss)]
        let (width, height) = (logo.width() as f32 * scale, logo.height() as f32 * scale);
        let (w, h) = canvas_size("scaled logo", width.round(), height.round())?;
        let image = if (w, h) == logo.dimensions() {
            logo.clone()
        } else {
            imageops::resize(logo, w, h, FilterType::Triangle)
        };
        Ok(Self {
            image,
            width,
            height,
        })
    }
}

/// Draw `spec` onto `target`.
///
/// Returns `false` without touching the image when there is nothing to draw:
/// kind `none`, empty text, or a missing font / logo. `show_guide` adds the
/// dashed placement outline used by interactive previews (single placement only).
///
/// # Errors
///
/// Returns [`Error::Settings`] if the text color is malformed or the content
/// or tile cell would exceed [`MAX_CANVAS_SIDE`].
pub fn draw_watermark(
    target: &mut RgbaImage,
    spec: &WatermarkSpec,
    assets: &WatermarkAssets,
    show_guide: bool,
) -> Result<bool> {
    let Some(content) = content_for(spec, assets)? else {
        return Ok(false);
    };
    let opacity = spec.opacity.clamp(0.0, 1.0);

    match spec.placement {
        Placement::Single => {
            #[allow(clippy::cast_precision_loss)]
            let anchor = (
                spec.anchor.x * target.width() as f32,
                spec.anchor.y * target.height() as f32,
            );
            draw_rotated(target, &content.image, anchor, spec.rotation, opacity);
            if show_guide {
                draw_guide(target, &content, anchor, spec.rotation);
            }
        }
        Placement::Tile => {
            let cell = build_tile_cell(&content, spec.tile.gap, spec.tile.style, opacity)?;
            debug!(
                cell_w = cell.width(),
                cell_h = cell.height(),
                style = ?spec.tile.style,
                "filling tile pattern"
            );
            fill_pattern(target, &cell, spec.rotation);
        }
    }

    Ok(true)
}

fn content_for(spec: &WatermarkSpec, assets: &WatermarkAssets) -> Result<Option<Content>> {
    match spec.kind {
        WatermarkKind::None => Ok(None),
        WatermarkKind::Text => {
            let Some(font) = &assets.font else {
                warn!("text watermark requested without a font, skipping");
                return Ok(None);
            };
            Content::text(font, &spec.text)
        }
        WatermarkKind::Logo => {
            let Some(logo) = &assets.logo else {
                debug!("logo watermark requested without a logo, skipping");
                return Ok(None);
            };
            Content::logo(logo, spec.logo.scale).map(Some)
        }
    }
}

/// Centers of the content copies inside a `cell_w` x `cell_h` repeat cell.
///
/// An `n` x `n` style puts copy `(c, r)` at
/// `((c + 0.5) / n * cell_w, (r + 0.5) / n * cell_h)`.
#[must_use]
pub fn tile_positions(cell_w: f32, cell_h: f32, style: TileStyle) -> Vec<(f32, f32)> {
    let n = style.per_side();
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f32;
    let mut positions = Vec::with_capacity((n * n) as usize);
    for row in 0..n {
        for col in 0..n {
            #[allow(clippy::cast_precision_loss)]
            positions.push((
                (col as f32 + 0.5) / nf * cell_w,
                (row as f32 + 0.5) / nf * cell_h,
            ));
        }
    }
    positions
}

/// Build one repeat cell: `(content + gap)` in each axis, holding the copies
/// `style` asks for, each drawn at `opacity`.
///
/// # Errors
///
/// Returns [`Error::Settings`] if the cell would not fit in [`MAX_CANVAS_SIDE`].
pub fn build_tile_cell(
    content: &Content,
    gap: f32,
    style: TileStyle,
    opacity: f32,
) -> Result<RgbaImage> {
    let (cell_w, cell_h) = canvas_size("tile cell", content.width + gap, content.height + gap)?;
    let mut cell = RgbaImage::new(cell_w, cell_h);

    #[allow(clippy::cast_precision_loss)]
    let (half_w, half_h) = (
        content.image.width() as f32 / 2.0,
        content.image.height() as f32 / 2.0,
    );
    #[allow(clippy::cast_precision_loss)]
    for (cx, cy) in tile_positions(cell_w as f32, cell_h as f32, style) {
        #[allow(clippy::cast_possible_truncation)]
        let (left, top) = ((cx - half_w).round() as i64, (cy - half_h).round() as i64);
        stamp(&mut cell, &content.image, left, top, opacity);
    }

    Ok(cell)
}

/// Round `width` x `height` up to whole pixels, at least one each.
fn canvas_size(what: &str, width: f32, height: f32) -> Result<(u32, u32)> {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    let side = |v: f32| -> Option<u32> {
        if !v.is_finite() {
            return None;
        }
        let v = v.ceil().max(1.0);
        (v <= MAX_CANVAS_SIDE as f32).then_some(v as u32)
    };
    match (side(width), side(height)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(Error::Settings(format!(
            "{what} of {width}x{height} pixels exceeds {MAX_CANVAS_SIDE} per side"
        ))),
    }
}

/// Blend `src` onto `dst` with its top-left corner at `(left, top)`, clipped to `dst`.
fn stamp(dst: &mut RgbaImage, src: &RgbaImage, left: i64, top: i64, opacity: f32) {
    for (sx, sy, px) in src.enumerate_pixels() {
        let (x, y) = (left + i64::from(sx), top + i64::from(sy));
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            continue;
        };
        if x < dst.width() && y < dst.height() {
            blend_over(dst.get_pixel_mut(x, y), *px, opacity);
        }
    }
}

/// Fill `target` with `cell` repeated from the origin of a frame rotated by
/// `rotation` degrees about the image center.
///
/// The pattern covers `[-w, 2w) x [-h, 2h)` in the rotated frame, three times
/// the image in each axis, so no corner is left empty after rotation.
pub fn fill_pattern(target: &mut RgbaImage, cell: &RgbaImage, rotation: f32) {
    let (w, h) = target.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let (wf, hf) = (w as f32, h as f32);
    let (cx, cy) = (wf / 2.0, hf / 2.0);
    let (sin, cos) = rotation.to_radians().sin_cos();
    let (cell_w, cell_h) = (i64::from(cell.width()), i64::from(cell.height()));

    target
        .par_chunks_mut(w as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                let px = dx * cos + dy * sin + cx;
                let py = -dx * sin + dy * cos + cy;
                if px < -wf || px >= 2.0 * wf || py < -hf || py >= 2.0 * hf {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let (sx, sy) = (
                    (px.floor() as i64).rem_euclid(cell_w) as u32,
                    (py.floor() as i64).rem_euclid(cell_h) as u32,
                );
                let src = *cell.get_pixel(sx, sy);
                if src[3] == 0 {
                    continue;
                }
                let mut out = Rgba([dst[0], dst[1], dst[2], dst[3]]);
                blend_over(&mut out, src, 1.0);
                dst.copy_from_slice(&out.0);
            }
        });
}

/// Draw `src` centered on `anchor`, rotated clockwise by `rotation` degrees.
fn draw_rotated(
    target: &mut RgbaImage,
    src: &RgbaImage,
    anchor: (f32, f32),
    rotation: f32,
    opacity: f32,
) {
    let (sin, cos) = rotation.to_radians().sin_cos();
    #[allow(clippy::cast_precision_loss)]
    let (half_w, half_h) = (src.width() as f32 / 2.0, src.height() as f32 / 2.0);

    let corners = [
        (-half_w, -half_h),
        (half_w, -half_h),
        (-half_w, half_h),
        (half_w, half_h),
    ]
    .map(|(u, v)| (anchor.0 + u * cos - v * sin, anchor.1 + u * sin + v * cos));

    let (min_x, max_x, min_y, max_y) = corners.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY),
        |(a, b, c, d), &(x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
    );

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let (x0, x1, y0, y1) = (
        min_x.floor().max(0.0) as u32,
        max_x.ceil().min(target.width() as f32).max(0.0) as u32,
        min_y.floor().max(0.0) as u32,
        max_y.ceil().min(target.height() as f32).max(0.0) as u32,
    );

    for y in y0..y1 {
        for x in x0..x1 {
            #[allow(clippy::cast_precision_loss)]
            let (dx, dy) = (x as f32 + 0.5 - anchor.0, y as f32 + 0.5 - anchor.1);
            // inverse rotation back into content space
            let sx = dx * cos + dy * sin + half_w;
            let sy = -dx * sin + dy * cos + half_h;
            if let Some(px) = sample_bilinear(src, sx - 0.5, sy - 0.5) {
                blend_over(target.get_pixel_mut(x, y), px, opacity);
            }
        }
    }
}

/// Bilinear sample with transparent surroundings, interpolated in premultiplied space.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn sample_bilinear(src: &RgbaImage, fx: f32, fy: f32) -> Option<Rgba<u8>> {
    if fx <= -1.0 || fy <= -1.0 || fx >= src.width() as f32 || fy >= src.height() as f32 {
        return None;
    }
    let (x0, y0) = (fx.floor(), fy.floor());
    let (tx, ty) = (fx - x0, fy - y0);

    let fetch = |x: f32, y: f32| -> [f32; 4] {
        let (x, y) = (x as i64, y as i64);
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) if x < src.width() && y < src.height() => {
                let p = src.get_pixel(x, y);
                let a = f32::from(p[3]) / 255.0;
                [
                    f32::from(p[0]) * a,
                    f32::from(p[1]) * a,
                    f32::from(p[2]) * a,
                    a,
                ]
            }
            _ => [0.0; 4],
        }
    };

    let taps = [
        (fetch(x0, y0), (1.0 - tx) * (1.0 - ty)),
        (fetch(x0 + 1.0, y0), tx * (1.0 - ty)),
        (fetch(x0, y0 + 1.0), (1.0 - tx) * ty),
        (fetch(x0 + 1.0, y0 + 1.0), tx * ty),
    ];
    let mut acc = [0.0f32; 4];
    for (px, weight) in taps {
        for (a, v) in acc.iter_mut().zip(px) {
            *a += v * weight;
        }
    }

    if acc[3] < 1.0 / 512.0 {
        return None;
    }
    let channel = |v: f32| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
    Some(Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ]))
}

/// Dashed outline around the content's layout box, unaffected by opacity.
fn draw_guide(target: &mut RgbaImage, content: &Content, anchor: (f32, f32), rotation: f32) {
    let (sin, cos) = rotation.to_radians().sin_cos();
    let (hw, hh) = (content.width / 2.0, content.height / 2.0);
    let edges = [
        ((-hw, -hh), (hw, -hh)),
        ((hw, -hh), (hw, hh)),
        ((hw, hh), (-hw, hh)),
        ((-hw, hh), (-hw, -hh)),
    ];
    let (on, off) = GUIDE_DASH;

    for ((ax, ay), (bx, by)) in edges {
        let length = (bx - ax).hypot(by - ay);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = length.ceil() as u32;
        for step in 0..steps {
            if step % (on + off) >= on {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let t = step as f32 / length.max(1.0);
            let (u, v) = (ax + (bx - ax) * t, ay + (by - ay) * t);
            let (x, y) = (anchor.0 + u * cos - v * sin, anchor.1 + u * sin + v * cos);
            #[allow(clippy::cast_possible_truncation)]
            let (x, y) = (x.floor() as i64, y.floor() as i64);
            if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
                if x < target.width() && y < target.height() {
                    blend_over(target.get_pixel_mut(x, y), GUIDE_COLOR, 1.0);
                }
            }
        }
    }
}

/// Blend `fg` over `bg` in place, scaling the foreground alpha by `opacity`.
fn blend_over(bg: &mut Rgba<u8>, fg: Rgba<u8>, opacity: f32) {
    let fg_alpha = f32::from(fg[3]) / 255.0 * opacity;
    if fg_alpha <= 0.0 {
        return;
    }
    let bg_alpha = f32::from(bg[3]) / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let blend = |f: u8, b: u8| -> u8 {
        let v = (f32::from(f) * fg_alpha + f32::from(b) * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        v.round().clamp(0.0, 255.0) as u8
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        *bg = Rgba([
            blend(fg[0], bg[0]),
            blend(fg[1], bg[1]),
            blend(fg[2], bg[2]),
            (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Anchor, TileSettings};
    use crate::text::test_support::fixture_font;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    fn logo_spec(placement: Placement) -> WatermarkSpec {
        WatermarkSpec {
            kind: WatermarkKind::Logo,
            placement,
            rotation: 0.0,
            opacity: 1.0,
            ..WatermarkSpec::default()
        }
    }

    fn red_logo(size: u32) -> WatermarkAssets {
        WatermarkAssets::default().with_logo(RgbaImage::from_pixel(size, size, RED))
    }

    fn count(img: &RgbaImage, color: Rgba<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn tile_positions_follow_grid_formula() {
        assert_eq!(tile_positions(12.0, 12.0, TileStyle::Single), vec![(6.0, 6.0)]);
        assert_eq!(
            tile_positions(12.0, 12.0, TileStyle::Grid4),
            vec![(3.0, 3.0), (9.0, 3.0), (3.0, 9.0), (9.0, 9.0)]
        );
        let nine = tile_positions(30.0, 60.0, TileStyle::Grid9);
        assert_eq!(nine.len(), 9);
        assert_eq!(nine[0], (5.0, 10.0));
        assert_eq!(nine[4], (15.0, 30.0));
        assert_eq!(nine[8], (25.0, 50.0));
    }

    #[test]
    fn tile_cell_holds_one_copy_per_grid_slot() {
        let content = Content::logo(&RgbaImage::from_pixel(2, 2, RED), 1.0).unwrap();
        for (style, copies) in [
            (TileStyle::Single, 1),
            (TileStyle::Grid4, 4),
            (TileStyle::Grid9, 9),
        ] {
            let cell = build_tile_cell(&content, 16.0, style, 1.0).unwrap();
            assert_eq!(cell.dimensions(), (18, 18));
            assert_eq!(count(&cell, RED), copies * 4, "{style:?}");
        }
    }

    #[test]
    fn tile_cell_copies_are_centered() {
        let content = Content::logo(&RgbaImage::from_pixel(2, 2, RED), 1.0).unwrap();
        let cell = build_tile_cell(&content, 10.0, TileStyle::Grid4, 1.0).unwrap();
        // 12x12 cell, copy centers at 3 and 9
        for (x, y) in [(2, 2), (3, 3), (8, 2), (9, 9)] {
            assert_eq!(*cell.get_pixel(x, y), RED, "({x},{y})");
        }
        assert_eq!(cell.get_pixel(6, 6)[3], 0);
    }

    #[test]
    fn tile_cell_applies_opacity() {
        let content = Content::logo(&RgbaImage::from_pixel(2, 2, RED), 1.0).unwrap();
        let cell = build_tile_cell(&content, 2.0, TileStyle::Single, 0.5).unwrap();
        assert_eq!(cell.get_pixel(2, 2)[3], 128);
    }

    #[test]
    fn kind_none_draws_nothing() {
        let mut img = RgbaImage::from_pixel(20, 20, GRAY);
        let spec = WatermarkSpec {
            kind: WatermarkKind::None,
            ..WatermarkSpec::default()
        };
        assert!(!draw_watermark(&mut img, &spec, &red_logo(4), false).unwrap());
        assert_eq!(count(&img, GRAY), 400);
    }

    #[test]
    fn logo_without_bitmap_draws_nothing() {
        let mut img = RgbaImage::from_pixel(20, 20, GRAY);
        let spec = logo_spec(Placement::Single);
        assert!(!draw_watermark(&mut img, &spec, &WatermarkAssets::default(), false).unwrap());
        assert_eq!(count(&img, GRAY), 400);
    }

    #[test]
    fn text_without_font_draws_nothing() {
        let mut img = RgbaImage::from_pixel(20, 20, GRAY);
        assert!(
            !draw_watermark(&mut img, &WatermarkSpec::default(), &WatermarkAssets::default(), false)
                .unwrap()
        );
        assert_eq!(count(&img, GRAY), 400);
    }

    #[test]
    fn single_logo_is_centered_on_anchor() {
        let mut img = RgbaImage::from_pixel(100, 50, GRAY);
        let spec = WatermarkSpec {
            anchor: Anchor { x: 0.25, y: 0.5 },
            ..logo_spec(Placement::Single)
        };
        assert!(draw_watermark(&mut img, &spec, &red_logo(4), false).unwrap());
        // anchor (25, 25), 4x4 logo covers 23..27
        assert_eq!(count(&img, RED), 16);
        for (x, y) in [(23, 23), (26, 26)] {
            assert_eq!(*img.get_pixel(x, y), RED);
        }
        assert_eq!(*img.get_pixel(22, 25), GRAY);
        assert_eq!(*img.get_pixel(27, 25), GRAY);
    }

    #[test]
    fn logo_scale_resizes_content() {
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        let spec = WatermarkSpec {
            logo: crate::settings::LogoStyle {
                path: None,
                scale: 2.0,
            },
            ..logo_spec(Placement::Single)
        };
        draw_watermark(&mut img, &spec, &red_logo(4), false).unwrap();
        let reddish = img.pixels().filter(|p| p[0] > 200 && p[1] < 50).count();
        assert_eq!(reddish, 64);
    }

    #[test]
    fn opacity_blends_content() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let spec = WatermarkSpec {
            opacity: 0.5,
            ..logo_spec(Placement::Single)
        };
        draw_watermark(&mut img, &spec, &red_logo(4), false).unwrap();
        assert_eq!(*img.get_pixel(10, 10), Rgba([128, 0, 0, 255]));
    }

    #[test]
    fn rotated_single_stays_near_anchor() {
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        let spec = WatermarkSpec {
            rotation: 45.0,
            ..logo_spec(Placement::Single)
        };
        draw_watermark(&mut img, &spec, &red_logo(10), false).unwrap();
        assert_eq!(*img.get_pixel(50, 50), RED);
        // the rotated diamond reaches ~7px out along the axes, not the old corners
        assert_eq!(*img.get_pixel(44, 44), GRAY);
        assert_ne!(*img.get_pixel(50, 44), GRAY);
    }

    #[test]
    fn guide_ignores_opacity() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let spec = WatermarkSpec {
            opacity: 0.0,
            ..logo_spec(Placement::Single)
        };
        draw_watermark(&mut img, &spec, &red_logo(20), true).unwrap();
        assert!(img.pixels().any(|p| p[2] > 0));
        assert!(img.pixels().all(|p| p[0] < 92));
    }

    #[test]
    fn tile_fill_covers_whole_image_without_rotation() {
        let mut img = RgbaImage::from_pixel(40, 40, GRAY);
        let spec = WatermarkSpec {
            tile: TileSettings {
                gap: 8.0,
                style: TileStyle::Single,
            },
            ..logo_spec(Placement::Tile)
        };
        draw_watermark(&mut img, &spec, &red_logo(2), false).unwrap();
        // 10x10 cells anchored at the origin, copy at 4..6 in each
        assert_eq!(count(&img, RED), 16 * 4);
        assert_eq!(*img.get_pixel(4, 4), RED);
        assert_eq!(*img.get_pixel(34, 25), RED);
        assert_eq!(*img.get_pixel(0, 0), GRAY);
    }

    #[test]
    fn rotated_tile_fill_leaves_no_empty_corner() {
        let mut img = RgbaImage::from_pixel(60, 30, GRAY);
        let spec = WatermarkSpec {
            rotation: 30.0,
            tile: TileSettings {
                gap: 0.0,
                style: TileStyle::Single,
            },
            ..logo_spec(Placement::Tile)
        };
        draw_watermark(&mut img, &spec, &red_logo(3), false).unwrap();
        assert_eq!(count(&img, RED), 60 * 30);
    }

    #[test]
    fn text_watermark_draws_with_font() {
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        let spec = WatermarkSpec {
            opacity: 1.0,
            rotation: 0.0,
            ..WatermarkSpec::default()
        };
        let assets = WatermarkAssets::default().with_font(fixture_font());
        assert!(draw_watermark(&mut img, &spec, &assets, false).unwrap());
        assert!(img.pixels().any(|p| p[0] > 200));
    }

    #[test]
    fn tiled_text_repeats_with_layout_width() {
        let font = fixture_font();
        let mut img = RgbaImage::from_pixel(400, 300, Rgba([0, 0, 0, 255]));
        let spec = WatermarkSpec {
            placement: Placement::Tile,
            opacity: 1.0,
            rotation: 0.0,
            text: TextStyle {
                font_size: 24.0,
                ..TextStyle::default()
            },
            tile: TileSettings {
                gap: 20.0,
                style: TileStyle::Single,
            },
            ..WatermarkSpec::default()
        };
        let assets = WatermarkAssets::default().with_font(font.clone());
        assert!(draw_watermark(&mut img, &spec, &assets, false).unwrap());

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cell_w = (text::measure_text(&font, "@watermark", 24.0) + 20.0).ceil() as u32;
        let cell_h = 44;
        assert!(cell_w < 200);

        for y in 0..300 - cell_h {
            for x in 0..400 - cell_w {
                assert_eq!(img.get_pixel(x, y), img.get_pixel(x + cell_w, y), "({x},{y})");
                assert_eq!(img.get_pixel(x, y), img.get_pixel(x, y + cell_h), "({x},{y})");
            }
        }
        let inked = img.pixels().filter(|p| p[0] > 128).count();
        assert!(inked > 0);
        assert!(inked < 400 * 300 / 2);
    }

    #[test]
    fn single_rotation_turns_clockwise() {
        const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
        // 10x2 bar, red on its right end
        let bar = RgbaImage::from_fn(10, 2, |x, _| if x >= 8 { RED } else { BLUE });
        let assets = WatermarkAssets::default().with_logo(bar);
        let reddish = |p: &Rgba<u8>| p[0] > 200 && p[2] < 50;
        let bluish = |p: &Rgba<u8>| p[2] > 200 && p[0] < 50;

        let render = |rotation: f32| {
            let mut img = RgbaImage::from_pixel(40, 40, GRAY);
            let spec = WatermarkSpec {
                rotation,
                ..logo_spec(Placement::Single)
            };
            draw_watermark(&mut img, &spec, &assets, false).unwrap();
            img
        };

        let flat = render(0.0);
        assert!(reddish(flat.get_pixel(24, 20)));
        assert!(bluish(flat.get_pixel(16, 20)));

        // clockwise on screen: the right end swings down
        let cw = render(90.0);
        assert!(reddish(cw.get_pixel(20, 24)));
        assert!(bluish(cw.get_pixel(20, 16)));
        assert_eq!(*cw.get_pixel(24, 20), GRAY);

        let ccw = render(-90.0);
        assert!(reddish(ccw.get_pixel(20, 16)));
        assert!(bluish(ccw.get_pixel(20, 24)));
    }

    #[test]
    fn pattern_rotation_maps_cell_columns_to_rows() {
        // only the cell's left column is inked
        let cell = RgbaImage::from_fn(8, 8, |x, _| if x == 0 { RED } else { Rgba([0, 0, 0, 0]) });
        let render = |rotation: f32| {
            let mut img = RgbaImage::from_pixel(8, 8, GRAY);
            fill_pattern(&mut img, &cell, rotation);
            img
        };

        let flat = render(0.0);
        for (x, y, p) in flat.enumerate_pixels() {
            assert_eq!(*p == RED, x == 0, "({x},{y})");
        }
        let cw = render(90.0);
        for (x, y, p) in cw.enumerate_pixels() {
            assert_eq!(*p == RED, y == 0, "({x},{y})");
        }
        let ccw = render(-90.0);
        for (x, y, p) in ccw.enumerate_pixels() {
            assert_eq!(*p == RED, y == 7, "({x},{y})");
        }
    }

    #[test]
    fn oversized_tile_cell_is_rejected() {
        let mut img = RgbaImage::from_pixel(20, 20, GRAY);
        let spec = WatermarkSpec {
            tile: TileSettings {
                gap: 1e10,
                style: TileStyle::Single,
            },
            ..logo_spec(Placement::Tile)
        };
        assert!(matches!(
            draw_watermark(&mut img, &spec, &red_logo(2), false),
            Err(Error::Settings(_))
        ));
        assert_eq!(count(&img, GRAY), 400);

        let huge = WatermarkSpec {
            logo: crate::settings::LogoStyle {
                path: None,
                scale: 1e7,
            },
            ..logo_spec(Placement::Single)
        };
        assert!(draw_watermark(&mut img, &huge, &red_logo(2), false).is_err());
    }
}
