//! Core watermark engine.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::alpha_maps::{AssetDir, MaskCache, MaskSource, MaskTier};
use crate::blending;
use crate::compositor::{self, WatermarkAssets};
use crate::error::{Error, Result};
use crate::export::{self, is_supported_image};
use crate::pipeline::{self, Stage};
use crate::settings::{Placement, RenderSettings};

/// What overlay removal did to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The overlay was un-blended.
    Removed {
        /// Tier whose footprint was processed.
        tier: MaskTier,
        /// Pixels rewritten.
        pixels: usize,
    },
    /// The reference masks are unavailable; the image is unchanged.
    Unavailable,
}

/// Output of a render call.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Final pixels.
    pub image: RgbaImage,
    /// Result of the removal stage, if it ran.
    pub removal: Option<RemovalOutcome>,
    /// Whether a watermark was drawn.
    pub watermarked: bool,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the output was written.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the write was declined rather than failed.
    pub cancelled: bool,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, err: &Error) -> Self {
        Self {
            path: path.to_path_buf(),
            output: None,
            success: false,
            cancelled: err.is_cancelled(),
            message: err.to_string(),
        }
    }
}

/// The watermark engine holding the reference alpha-mask cache.
///
/// Create once and reuse for every image of a session; the masks are decoded
/// on the first removal request and kept until the engine is dropped.
#[derive(Debug)]
pub struct WatermarkEngine {
    masks: MaskCache,
}

impl WatermarkEngine {
    /// Create an engine whose reference captures come from `source`.
    pub fn new(source: impl MaskSource + 'static) -> Self {
        Self {
            masks: MaskCache::new(source),
        }
    }

    /// Create an engine reading `bg_48.png` / `bg_96.png` from `dir`.
    pub fn with_asset_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(AssetDir::new(dir))
    }

    /// The reference mask cache.
    #[must_use]
    pub fn masks(&self) -> &MaskCache {
        &self.masks
    }

    /// Determine the overlay tier based on image dimensions.
    #[must_use]
    #[allow(clippy::unused_self)] // method on `self` for API consistency
    pub fn tier_for(&self, width: u32, height: u32) -> MaskTier {
        MaskTier::for_dimensions(width, height)
    }

    /// Top-left corner of the overlay footprint, clamped to the image.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn footprint_origin(&self, width: u32, height: u32, tier: MaskTier) -> (u32, u32) {
        let extent = tier.size() + tier.margin();
        (width.saturating_sub(extent), height.saturating_sub(extent))
    }

    /// Remove the known overlay from an image in-place.
    ///
    /// `force_tier` overrides the resolution-based tier selection. When the
    /// reference masks are unavailable the image is left untouched.
    pub fn remove_overlay(
        &self,
        image: &mut RgbaImage,
        force_tier: Option<MaskTier>,
    ) -> RemovalOutcome {
        let Some(masks) = self.masks.get_or_build() else {
            return RemovalOutcome::Unavailable;
        };

        let (width, height) = image.dimensions();
        let tier = force_tier.unwrap_or_else(|| self.tier_for(width, height));
        let (pos_x, pos_y) = self.footprint_origin(width, height, tier);
        let pixels = blending::remove_overlay_region(image, masks.get(tier), pos_x, pos_y);

        debug!(?tier, pos_x, pos_y, pixels, "overlay removed");
        RemovalOutcome::Removed { tier, pixels }
    }

    /// Run the render pipeline over a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the watermark color is malformed or the
    /// watermark content is too large to rasterize.
    pub fn render(
        &self,
        image: RgbaImage,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
    ) -> Result<Rendered> {
        self.run(image, settings, assets, false)
    }

    /// Like [`WatermarkEngine::render`], with the placement guide drawn for interactive previews.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the watermark color is malformed or the
    /// watermark content is too large to rasterize.
    pub fn render_preview(
        &self,
        image: RgbaImage,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
    ) -> Result<Rendered> {
        self.run(image, settings, assets, true)
    }

    fn run(
        &self,
        mut image: RgbaImage,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
        show_guide: bool,
    ) -> Result<Rendered> {
        let mut removal = None;
        let mut watermarked = false;

        for stage in pipeline::plan(settings) {
            match stage {
                Stage::RemoveOverlay => {
                    removal = Some(self.remove_overlay(&mut image, None));
                }
                Stage::Resize { mode, value } => {
                    image = export::resize_image(image, mode, value);
                    debug!(width = image.width(), height = image.height(), "resized");
                }
                Stage::Composite => {
                    watermarked = compositor::draw_watermark(
                        &mut image,
                        &settings.watermark,
                        assets,
                        show_guide,
                    )?;
                }
            }
        }

        Ok(Rendered {
            image,
            removal,
            watermarked,
        })
    }

    /// Process a single image file: load, render, save into `output_dir`.
    ///
    /// An output name that resolves to `input` itself is refused with
    /// [`Error::OverwriteSource`] before anything is written.
    ///
    /// `index` is the zero-based position of the file in its batch, used for
    /// sequence naming and the per-image random anchor.
    #[must_use]
    pub fn process_file(
        &self,
        input: &Path,
        output_dir: &Path,
        index: usize,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
    ) -> ProcessResult {
        match self.export_file(input, output_dir, index, settings, assets) {
            Ok((output, rendered)) => {
                let message = describe(&rendered);
                info!(input = %input.display(), output = %output.display(), "{message}");
                ProcessResult {
                    path: input.to_path_buf(),
                    output: Some(output),
                    success: true,
                    cancelled: false,
                    message,
                }
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "processing failed");
                ProcessResult::failed(input, &e)
            }
        }
    }

    fn export_file(
        &self,
        input: &Path,
        output_dir: &Path,
        index: usize,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
    ) -> Result<(PathBuf, Rendered)> {
        if !is_supported_image(input) {
            let ext = input
                .extension()
                .map_or_else(String::new, |e| e.to_string_lossy().into_owned());
            return Err(Error::UnsupportedFormat(ext));
        }
        let name = input
            .file_name()
            .map_or_else(|| "image".to_string(), |n| n.to_string_lossy().into_owned());
        let format = export::resolve_output_format(input, &settings.export);
        let output = output_dir.join(export::output_name(
            &name,
            index,
            format.extension(),
            &settings.export,
        ));
        if is_same_file(input, &output) {
            return Err(Error::OverwriteSource { path: output });
        }
        let image = open_image(input)?;

        let settings = if settings.export.randomize_position
            && settings.watermark.placement == Placement::Single
        {
            let mut owned = settings.clone();
            owned.watermark.anchor = export::random_position(&format!("{name}-{index}"));
            Cow::Owned(owned)
        } else {
            Cow::Borrowed(settings)
        };

        let rendered = self.render(image, &settings, assets)?;
        export::save_image(&rendered.image, &output, format)?;
        Ok((output, rendered))
    }

    /// Process `inputs` one at a time, writing results into `output_dir`.
    ///
    /// Returns a [`ProcessResult`] for each image attempted. A cancelled write
    /// stops the batch; the remaining inputs are not attempted.
    #[must_use]
    pub fn process_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        settings: &RenderSettings,
        assets: &WatermarkAssets,
    ) -> Vec<ProcessResult> {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            let err = Error::from_write(e, output_dir);
            warn!(dir = %output_dir.display(), error = %err, "cannot prepare output directory");
            return vec![ProcessResult::failed(output_dir, &err)];
        }

        let mut results = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let result = self.process_file(input, output_dir, index, settings, assets);
            let cancelled = result.cancelled;
            results.push(result);
            if cancelled {
                warn!("export cancelled, stopping batch");
                break;
            }
        }
        results
    }
}

fn describe(rendered: &Rendered) -> String {
    let removal = match rendered.removal {
        Some(RemovalOutcome::Removed { tier, pixels }) => {
            Some(format!("overlay removed ({tier:?} tier, {pixels} pixels)"))
        }
        Some(RemovalOutcome::Unavailable) => Some("overlay masks unavailable".to_string()),
        None => None,
    };
    let watermark = rendered.watermarked.then(|| "watermark added".to_string());

    match (removal, watermark) {
        (Some(r), Some(w)) => format!("{r}, {w}"),
        (Some(r), None) => r,
        (None, Some(w)) => w,
        (None, None) => "saved unchanged".to_string(),
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Decode an image from memory into RGBA.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a supported image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)
        .map_err(Error::Decode)?
        .to_rgba8())
}

/// Read and decode an image file into RGBA.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read and [`Error::Decode`] if it cannot be decoded.
pub fn open_image(path: &Path) -> Result<RgbaImage> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// List the supported images directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}
