//! Batch image watermarking with known-overlay removal.
//!
//! Draws a text or logo watermark onto images, either as a single rotated
//! copy or as a tiled pattern, and can first strip a known semi-transparent
//! overlay by reversing the alpha-blending equation against calibrated
//! 48x48 and 96x96 reference masks.
//!
//! # Quick Start
//!
//! ```no_run
//! use easy_watermark::{RenderSettings, WatermarkAssets, WatermarkEngine};
//!
//! let engine = WatermarkEngine::with_asset_dir("assets");
//! let settings = RenderSettings::from_json_file("settings.json".as_ref()).unwrap();
//! let assets = WatermarkAssets::load(&settings.watermark).unwrap();
//! let img = image::open("photo.jpg").unwrap().to_rgba8();
//! let rendered = engine.render(img, &settings, &assets).unwrap();
//! rendered.image.save("watermarked.png").unwrap();
//! ```
//!
//! # Overlay removal
//!
//! The reference masks are decoded on the first removal request and shared
//! by every later one. Without them removal degrades to a no-op.
//!
//! ```no_run
//! use easy_watermark::{RemovalOutcome, WatermarkEngine};
//!
//! let engine = WatermarkEngine::with_asset_dir("assets");
//! let mut img = image::open("capture.png").unwrap().to_rgba8();
//! if let RemovalOutcome::Removed { tier, pixels } = engine.remove_overlay(&mut img, None) {
//!     println!("{tier:?}: {pixels} pixels restored");
//! }
//! ```

#![deny(missing_docs)]

pub mod alpha_maps;
pub mod blending;
pub mod compositor;
mod engine;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod settings;
pub mod templates;
pub mod text;

pub use alpha_maps::{AssetDir, MaskSource, MaskTier, StaticMasks};
pub use compositor::{draw_watermark, WatermarkAssets};
pub use engine::{
    collect_images, decode_image, open_image, ProcessResult, RemovalOutcome, Rendered,
    WatermarkEngine,
};
pub use error::{Error, Result};
pub use export::{is_supported_image, save_image, OutputFormat};
pub use pipeline::{RequestToken, RequestTracker};
pub use settings::RenderSettings;
pub use templates::{Template, TemplateStore};
