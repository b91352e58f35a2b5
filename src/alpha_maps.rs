//! Reference alpha masks for the known visible overlay.
//!
//! The overlay is a translucent white graphic anchored to the bottom-right
//! corner at one of two fixed sizes. Its coverage is recovered from reference
//! captures of the overlay rendered on black, where the brightest channel of
//! each pixel approximates the blend strength.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Overlay size tier, selected by image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskTier {
    /// 48x48 footprint, 32px margin (images where either dimension <= 1024).
    Small,
    /// 96x96 footprint, 64px margin (images where both dimensions > 1024).
    Large,
}

impl MaskTier {
    /// Select the tier for an image of the given dimensions.
    ///
    /// - **Large**: both width AND height > 1024
    /// - **Small**: otherwise (including 1024x1024)
    #[must_use]
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width > 1024 && height > 1024 {
            Self::Large
        } else {
            Self::Small
        }
    }

    /// Edge length of the square footprint in pixels.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::Small => 48,
            Self::Large => 96,
        }
    }

    /// Distance of the footprint from the right and bottom edges.
    #[must_use]
    pub fn margin(self) -> u32 {
        match self {
            Self::Small => 32,
            Self::Large => 64,
        }
    }

    /// File name of the reference capture inside an asset directory.
    #[must_use]
    pub fn asset_name(self) -> &'static str {
        match self {
            Self::Small => "bg_48.png",
            Self::Large => "bg_96.png",
        }
    }
}

/// Per-pixel overlay coverage in `[0, 1]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl AlphaMask {
    /// Wrap precomputed coverage values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapSize`] if `values` does not hold `width * height` entries.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        if values.len() != (width as usize) * (height as usize) {
            return Err(Error::AlphaMapSize {
                width,
                height,
                size: u32::try_from(values.len()).unwrap_or(u32::MAX),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// A mask with the same coverage everywhere.
    #[must_use]
    pub fn uniform(width: u32, height: u32, coverage: f32) -> Self {
        Self {
            width,
            height,
            values: vec![coverage.clamp(0.0, 1.0); (width as usize) * (height as usize)],
        }
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coverage at `(col, row)`, or `None` outside the mask.
    #[must_use]
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values
            .get((row as usize) * (self.width as usize) + col as usize)
            .copied()
    }

    /// Raw coverage values, row-major.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Calculate an alpha mask from reference capture PNG bytes.
///
/// The alpha at each pixel is derived as: `alpha = max(R, G, B) / 255.0`.
///
/// # Errors
///
/// Returns [`Error::AlphaMapDecode`] if the data cannot be decoded.
pub fn build_mask(png_bytes: &[u8]) -> Result<AlphaMask> {
    let img = image::load_from_memory(png_bytes)
        .map_err(Error::AlphaMapDecode)?
        .to_rgb8();

    let values = img
        .pixels()
        .map(|px| f32::from(px[0].max(px[1]).max(px[2])) / 255.0)
        .collect();

    Ok(AlphaMask {
        width: img.width(),
        height: img.height(),
        values,
    })
}

/// Host-supplied reference captures, one per tier.
pub trait MaskSource: Send + Sync {
    /// Load the encoded reference capture for `tier`.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset is missing or unreadable.
    fn load(&self, tier: MaskTier) -> Result<Vec<u8>>;
}

/// Reference captures stored as `bg_48.png` / `bg_96.png` in a directory.
#[derive(Debug, Clone)]
pub struct AssetDir {
    dir: PathBuf,
}

impl AssetDir {
    /// Read reference captures from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the captures are read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl MaskSource for AssetDir {
    fn load(&self, tier: MaskTier) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.dir.join(tier.asset_name()))?)
    }
}

/// Reference captures already held in memory.
#[derive(Debug, Clone)]
pub struct StaticMasks {
    small: Vec<u8>,
    large: Vec<u8>,
}

impl StaticMasks {
    /// Use `small` and `large` as the encoded captures for each tier.
    pub fn new(small: impl Into<Vec<u8>>, large: impl Into<Vec<u8>>) -> Self {
        Self {
            small: small.into(),
            large: large.into(),
        }
    }
}

impl MaskSource for StaticMasks {
    fn load(&self, tier: MaskTier) -> Result<Vec<u8>> {
        Ok(match tier {
            MaskTier::Small => self.small.clone(),
            MaskTier::Large => self.large.clone(),
        })
    }
}

/// Both tier masks, built together.
#[derive(Debug, Clone)]
pub struct MaskPair {
    small: AlphaMask,
    large: AlphaMask,
}

impl MaskPair {
    /// Mask for `tier`.
    #[must_use]
    pub fn get(&self, tier: MaskTier) -> &AlphaMask {
        match tier {
            MaskTier::Small => &self.small,
            MaskTier::Large => &self.large,
        }
    }
}

/// Lazily built, process-lifetime cache of the tier masks.
///
/// The first caller of [`MaskCache::get_or_build`] decodes both captures;
/// callers arriving while that build is in flight wait for its result instead
/// of decoding again. A failed build is remembered, so removal stays a no-op
/// for the rest of the session.
pub struct MaskCache {
    source: Box<dyn MaskSource>,
    masks: OnceLock<Option<MaskPair>>,
    builds: AtomicUsize,
}

impl MaskCache {
    /// Create an empty cache backed by `source`.
    pub fn new(source: impl MaskSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            masks: OnceLock::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Return the cached masks, building them on first use.
    ///
    /// Returns `None` if the reference captures could not be loaded.
    pub fn get_or_build(&self) -> Option<&MaskPair> {
        self.masks
            .get_or_init(|| {
                self.builds.fetch_add(1, Ordering::SeqCst);
                match self.build() {
                    Ok(pair) => {
                        debug!("alpha masks built");
                        Some(pair)
                    }
                    Err(e) => {
                        warn!(error = %e, "alpha masks unavailable, overlay removal disabled");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Whether a build has completed (successfully or not).
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.masks.get().is_some()
    }

    /// Number of builds started so far. Never exceeds one.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn build(&self) -> Result<MaskPair> {
        Ok(MaskPair {
            small: self.build_tier(MaskTier::Small)?,
            large: self.build_tier(MaskTier::Large)?,
        })
    }

    fn build_tier(&self, tier: MaskTier) -> Result<AlphaMask> {
        let bytes = self.source.load(tier)?;
        let mask = build_mask(&bytes)?;
        let size = tier.size();
        if mask.width != size || mask.height != size {
            return Err(Error::AlphaMapSize {
                width: mask.width,
                height: mask.height,
                size,
            });
        }
        Ok(mask)
    }
}

impl std::fmt::Debug for MaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskCache")
            .field("warm", &self.is_warm())
            .field("builds", &self.build_count())
            .finish_non_exhaustive()
    }
}
