//! Output sizing, naming and encoding.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Error, Result};
use crate::settings::{Anchor, ExportSettings, FormatChoice, RenameMode, ResizeMode};

/// Encoding chosen for one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossless PNG.
    Png,
    /// JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality, 1-100.
        quality: u8,
    },
}

impl OutputFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

/// Resize `image` according to `mode`, keeping the aspect ratio.
///
/// Every output side is at least one pixel. [`ResizeMode::None`] returns the image unchanged.
#[must_use]
pub fn resize_image(image: RgbaImage, mode: ResizeMode, value: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image;
    }
    let (target_w, target_h) = target_size(width, height, mode, value);
    if (target_w, target_h) == (width, height) {
        return image;
    }
    imageops::resize(&image, target_w, target_h, FilterType::Triangle)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn target_size(width: u32, height: u32, mode: ResizeMode, value: u32) -> (u32, u32) {
    let (w, h, v) = (f64::from(width), f64::from(height), f64::from(value));
    let (tw, th) = match mode {
        ResizeMode::None => (w, h),
        ResizeMode::Width => (v, (h / w * v).round()),
        ResizeMode::Height => ((w / h * v).round(), v),
        ResizeMode::Max => {
            let scale = v / w.max(h);
            ((w * scale).round(), (h * scale).round())
        }
    };
    (tw.max(1.0) as u32, th.max(1.0) as u32)
}

/// Pick the output encoding for `input`.
///
/// In auto mode JPEG inputs stay JPEG and everything else becomes PNG.
#[must_use]
pub fn resolve_output_format(input: &Path, export: &ExportSettings) -> OutputFormat {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let quality = (export.quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
    let jpeg = OutputFormat::Jpeg { quality };

    match export.format {
        FormatChoice::Png => OutputFormat::Png,
        FormatChoice::Jpg => jpeg,
        FormatChoice::Auto => match ImageFormat::from_path(input) {
            Ok(ImageFormat::Jpeg) => jpeg,
            _ => OutputFormat::Png,
        },
    }
}

/// Output file name for the `index`-th (zero-based) input called `input_name`.
#[must_use]
pub fn output_name(input_name: &str, index: usize, ext: &str, export: &ExportSettings) -> String {
    let base = strip_ext(input_name);
    match export.rename {
        RenameMode::Keep => format!("{base}.{ext}"),
        RenameMode::Prefix => {
            let prefix = non_empty(&export.rename_prefix, "wm_");
            format!("{prefix}{base}.{ext}")
        }
        RenameMode::Suffix => {
            let suffix = non_empty(&export.rename_suffix, "_watermarked");
            format!("{base}{suffix}.{ext}")
        }
        RenameMode::Sequence => {
            let start = u64::from(export.sequence_start.max(1));
            let number = start + index as u64;
            format!("image_{number:03}.{ext}")
        }
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn strip_ext(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// Deterministic anchor in `[0.15, 0.85]²` derived from `seed`.
///
/// Uses 32-bit FNV-1a over the UTF-16 code units of the seed.
#[must_use]
pub fn random_position(seed: &str) -> Anchor {
    let mut hash: u32 = 2_166_136_261;
    for unit in seed.encode_utf16() {
        hash ^= u32::from(unit);
        hash = hash.wrapping_mul(16_777_619);
    }
    #[allow(clippy::cast_precision_loss)]
    let (r1, r2) = (
        (hash % 1000) as f32 / 1000.0,
        ((hash >> 8) % 1000) as f32 / 1000.0,
    );
    Anchor {
        x: 0.15 + r1 * 0.7,
        y: 0.15 + r2 * 0.7,
    }
}

/// Encode `image` in `format`. JPEG output drops the alpha channel.
///
/// # Errors
///
/// Returns [`Error::Image`] if encoding fails.
pub fn encode_image(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Png => image.write_to(&mut out, ImageFormat::Png)?,
        OutputFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder.encode_image(&rgb)?;
        }
    }
    Ok(out.into_inner())
}

/// Encode `image` and write it to `path`.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if writing is not permitted, or the encode / I/O error.
pub fn save_image(image: &RgbaImage, path: &Path, format: OutputFormat) -> Result<()> {
    let bytes = encode_image(image, format)?;
    std::fs::write(path, bytes).map_err(|e| Error::from_write(e, path))
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn export(rename: RenameMode) -> ExportSettings {
        ExportSettings {
            rename,
            ..ExportSettings::default()
        }
    }

    #[test]
    fn resize_keeps_aspect_ratio() {
        let img = RgbaImage::new(400, 200);
        assert_eq!(
            resize_image(img.clone(), ResizeMode::Width, 100).dimensions(),
            (100, 50)
        );
        assert_eq!(
            resize_image(img.clone(), ResizeMode::Height, 100).dimensions(),
            (200, 100)
        );
        assert_eq!(
            resize_image(img.clone(), ResizeMode::Max, 300).dimensions(),
            (300, 150)
        );
        assert_eq!(
            resize_image(img, ResizeMode::None, 10).dimensions(),
            (400, 200)
        );
    }

    #[test]
    fn resize_never_produces_empty_images() {
        let img = RgbaImage::new(1000, 10);
        assert_eq!(
            resize_image(img, ResizeMode::Width, 10).dimensions(),
            (10, 1)
        );
        assert_eq!(target_size(10, 10, ResizeMode::Max, 0), (1, 1));
    }

    #[test]
    fn auto_format_follows_input() {
        let settings = ExportSettings::default();
        assert_eq!(
            resolve_output_format(Path::new("a.JPG"), &settings),
            OutputFormat::Jpeg { quality: 92 }
        );
        assert_eq!(
            resolve_output_format(Path::new("a.jpeg"), &settings),
            OutputFormat::Jpeg { quality: 92 }
        );
        assert_eq!(
            resolve_output_format(Path::new("a.webp"), &settings),
            OutputFormat::Png
        );
        assert_eq!(
            resolve_output_format(Path::new("noext"), &settings),
            OutputFormat::Png
        );
    }

    #[test]
    fn explicit_format_wins() {
        let png = ExportSettings {
            format: FormatChoice::Png,
            ..ExportSettings::default()
        };
        assert_eq!(
            resolve_output_format(Path::new("a.jpg"), &png),
            OutputFormat::Png
        );
        let jpg = ExportSettings {
            format: FormatChoice::Jpg,
            quality: 0.5,
            ..ExportSettings::default()
        };
        assert_eq!(
            resolve_output_format(Path::new("a.png"), &jpg),
            OutputFormat::Jpeg { quality: 50 }
        );
    }

    #[test]
    fn output_names_follow_rename_mode() {
        assert_eq!(
            output_name("photo.final.png", 0, "png", &export(RenameMode::Keep)),
            "photo.final.png"
        );
        assert_eq!(
            output_name("photo.jpg", 0, "jpg", &export(RenameMode::Prefix)),
            "wm_photo.jpg"
        );
        assert_eq!(
            output_name("photo.jpg", 0, "png", &export(RenameMode::Suffix)),
            "photo_watermarked.png"
        );
        assert_eq!(
            output_name("a.jpg", 0, "jpg", &export(RenameMode::Sequence)),
            "image_001.jpg"
        );
        assert_eq!(
            output_name("b.jpg", 11, "jpg", &export(RenameMode::Sequence)),
            "image_012.jpg"
        );
        assert_eq!(
            output_name("noext", 0, "png", &export(RenameMode::Keep)),
            "noext.png"
        );
    }

    #[test]
    fn empty_prefix_falls_back_to_default() {
        let settings = ExportSettings {
            rename: RenameMode::Prefix,
            rename_prefix: String::new(),
            ..ExportSettings::default()
        };
        assert_eq!(output_name("x.png", 0, "png", &settings), "wm_x.png");
    }

    #[test]
    fn random_position_is_deterministic_and_bounded() {
        let a = random_position("photo.jpg");
        let b = random_position("photo.jpg");
        assert_eq!(a, b);
        for seed in ["", "a", "photo-1", "照片.png", "long seed with spaces"] {
            let p = random_position(seed);
            assert!((0.15..=0.85).contains(&p.x), "{seed}: {p:?}");
            assert!((0.15..=0.85).contains(&p.y), "{seed}: {p:?}");
        }
        assert_ne!(random_position("one"), random_position("two"));
    }

    #[test]
    fn empty_seed_uses_offset_basis() {
        // 2166136261 % 1000 = 261, (2166136261 >> 8) % 1000 = 469
        let p = random_position("");
        assert!((p.x - (0.15 + 0.261 * 0.7)).abs() < 1e-6);
        assert!((p.y - (0.15 + 0.469 * 0.7)).abs() < 1e-6);
    }

    #[test]
    fn encode_png_round_trips_pixels() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 40]));
        let bytes = encode_image(&img, OutputFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn encode_jpeg_produces_jpeg() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 255]));
        let bytes = encode_image(&img, OutputFormat::Jpeg { quality: 90 }).unwrap();
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn save_image_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        save_image(&RgbaImage::new(4, 4), &path, OutputFormat::Png).unwrap();
        assert!(path.exists());
    }
}
