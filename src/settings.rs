//! Render and export settings.
//!
//! A [`RenderSettings`] value is the full snapshot a caller hands to
//! [`WatermarkEngine::render`](crate::WatermarkEngine::render). It serializes to JSON so it can
//! be stored as a settings file or inside a template.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::text::parse_hex_color;

/// Largest accepted logo scale factor.
pub const MAX_LOGO_SCALE: f32 = 20.0;
/// Largest accepted font size in pixels.
pub const MAX_FONT_SIZE: f32 = 2000.0;
/// Largest accepted tile gap in pixels.
pub const MAX_TILE_GAP: f32 = 10_000.0;

/// What a render call does with the source image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessMode {
    /// Draw a new watermark.
    #[default]
    Add,
    /// Strip the known visible overlay.
    RemoveOverlay,
}

/// Kind of watermark content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    /// Draw nothing.
    None,
    /// A line of text.
    #[default]
    Text,
    /// A logo bitmap.
    Logo,
}

/// How the content is placed on the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// One copy centered on the anchor point.
    #[default]
    Single,
    /// A repeating pattern over the whole image.
    Tile,
}

/// Number of copies in each repeat cell of a tiled watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileStyle {
    /// One centered copy per cell.
    #[default]
    Single,
    /// Four copies on a 2x2 grid.
    #[serde(rename = "grid-4")]
    Grid4,
    /// Nine copies on a 3x3 grid.
    #[serde(rename = "grid-9")]
    Grid9,
}

impl TileStyle {
    /// Copies along each axis of a cell.
    #[must_use]
    pub fn per_side(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Grid4 => 2,
            Self::Grid9 => 3,
        }
    }
}

/// Anchor point as a fraction of image width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Horizontal fraction in `[0, 1]`.
    pub x: f32,
    /// Vertical fraction in `[0, 1]`.
    pub y: f32,
}

impl Default for Anchor {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

/// Text watermark payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Text to draw.
    pub content: String,
    /// Font file (TrueType or OpenType).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
    /// Font size in pixels.
    pub font_size: f32,
    /// Fill color, `#RGB` or `#RRGGBB`.
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            content: "@watermark".to_string(),
            font: None,
            font_size: 48.0,
            color: "#ffffff".to_string(),
        }
    }
}

/// Logo watermark payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoStyle {
    /// Logo image file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Uniform scale factor applied to the logo.
    pub scale: f32,
}

impl Default for LogoStyle {
    fn default() -> Self {
        Self {
            path: None,
            scale: 1.0,
        }
    }
}

/// Tile pattern parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    /// Extra space added to the content size to form a repeat cell.
    pub gap: f32,
    /// Copies per cell.
    pub style: TileStyle,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            gap: 180.0,
            style: TileStyle::Single,
        }
    }
}

/// Everything needed to draw one watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSpec {
    /// Content kind.
    pub kind: WatermarkKind,
    /// Single or tiled placement.
    pub placement: Placement,
    /// Anchor for single placement.
    pub anchor: Anchor,
    /// Rotation in degrees, clockwise.
    pub rotation: f32,
    /// Opacity of the drawn content in `[0, 1]`.
    pub opacity: f32,
    /// Text payload.
    pub text: TextStyle,
    /// Logo payload.
    pub logo: LogoStyle,
    /// Tile pattern parameters.
    pub tile: TileSettings,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            placement: Placement::Single,
            anchor: Anchor::default(),
            rotation: -20.0,
            opacity: 0.35,
            text: TextStyle::default(),
            logo: LogoStyle::default(),
            tile: TileSettings::default(),
        }
    }
}

/// Output encoding choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatChoice {
    /// Keep JPEG inputs as JPEG, write everything else as PNG.
    #[default]
    Auto,
    /// Always PNG.
    Png,
    /// Always JPEG.
    #[serde(alias = "jpeg")]
    Jpg,
}

/// Output resize rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Keep the source size.
    #[default]
    None,
    /// Set the width, keep the aspect ratio.
    Width,
    /// Set the height, keep the aspect ratio.
    Height,
    /// Scale so the longer side equals the value.
    Max,
}

/// Output naming rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameMode {
    /// Keep the source file stem.
    #[default]
    Keep,
    /// Prepend a prefix.
    Prefix,
    /// Append a suffix.
    Suffix,
    /// Number the outputs `image_001`, `image_002`, ...
    Sequence,
}

/// Export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output encoding.
    pub format: FormatChoice,
    /// JPEG quality in `[0, 1]`.
    pub quality: f32,
    /// Resize rule.
    pub resize: ResizeMode,
    /// Target size in pixels for the resize rule.
    pub resize_value: u32,
    /// Naming rule.
    pub rename: RenameMode,
    /// Prefix for [`RenameMode::Prefix`].
    pub rename_prefix: String,
    /// Suffix for [`RenameMode::Suffix`].
    pub rename_suffix: String,
    /// First number for [`RenameMode::Sequence`].
    pub sequence_start: u32,
    /// Give every image its own pseudo-random anchor.
    pub randomize_position: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: FormatChoice::Auto,
            quality: 0.92,
            resize: ResizeMode::None,
            resize_value: 1024,
            rename: RenameMode::Keep,
            rename_prefix: "wm_".to_string(),
            rename_suffix: "_watermarked".to_string(),
            sequence_start: 1,
            randomize_position: false,
        }
    }
}

/// Full settings snapshot for a render call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Add a watermark or remove the known overlay.
    pub process_mode: ProcessMode,
    /// In remove mode, draw the watermark after removal.
    pub remove_then_add: bool,
    /// Watermark to draw.
    pub watermark: WatermarkSpec,
    /// Output settings.
    pub export: ExportSettings,
}

impl RenderSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails [`RenderSettings::validate`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Whether the watermark is drawn by this render.
    #[must_use]
    pub fn draws_watermark(&self) -> bool {
        self.process_mode == ProcessMode::Add || self.remove_then_add
    }

    /// Check that every numeric setting is finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        let wm = &self.watermark;
        unit_range("opacity", wm.opacity)?;
        unit_range("anchor.x", wm.anchor.x)?;
        unit_range("anchor.y", wm.anchor.y)?;
        unit_range("export.quality", self.export.quality)?;

        if !wm.rotation.is_finite() {
            return Err(Error::Settings(format!(
                "rotation must be finite, got {}",
                wm.rotation
            )));
        }
        if !wm.logo.scale.is_finite() || wm.logo.scale <= 0.0 || wm.logo.scale > MAX_LOGO_SCALE {
            return Err(Error::Settings(format!(
                "logo scale must be in (0, {MAX_LOGO_SCALE}], got {}",
                wm.logo.scale
            )));
        }
        if !wm.text.font_size.is_finite()
            || wm.text.font_size <= 0.0
            || wm.text.font_size > MAX_FONT_SIZE
        {
            return Err(Error::Settings(format!(
                "font size must be in (0, {MAX_FONT_SIZE}], got {}",
                wm.text.font_size
            )));
        }
        if !wm.tile.gap.is_finite() || wm.tile.gap < 0.0 || wm.tile.gap > MAX_TILE_GAP {
            return Err(Error::Settings(format!(
                "tile gap must be in [0, {MAX_TILE_GAP}], got {}",
                wm.tile.gap
            )));
        }
        parse_hex_color(&wm.text.color)?;
        Ok(())
    }
}

fn unit_range(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Settings(format!(
            "{field} must be between 0.0 and 1.0, got {value}"
        )))
    }
}
