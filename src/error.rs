//! Error types for the easy-watermark crate.

use std::path::PathBuf;

/// Errors that can occur while removing overlays, drawing watermarks or exporting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to decode a reference alpha-mask asset.
    #[error("failed to decode alpha map PNG: {0}")]
    AlphaMapDecode(image::ImageError),

    /// A reference alpha-mask asset does not match its tier footprint.
    #[error("alpha map is {width}x{height}, expected {size}x{size}")]
    AlphaMapSize {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Footprint size declared by the tier.
        size: u32,
    },

    /// A source image could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    /// A font file could not be parsed.
    #[error("invalid font: {0}")]
    Font(String),

    /// The render or export settings are out of range or malformed.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Writing to the chosen output location was declined.
    #[error("write to {} was cancelled", path.display())]
    Cancelled {
        /// Location the write was aimed at.
        path: PathBuf,
    },

    /// The output path resolves to the input file itself.
    #[error("refusing to overwrite source image {}", path.display())]
    OverwriteSource {
        /// Output path that points at the source.
        path: PathBuf,
    },

    /// A settings or template file could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (encode, save).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Whether this error represents a user cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Map an I/O error on `path`, turning a denied permission into [`Error::Cancelled`].
    pub(crate) fn from_write(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Cancelled { path: path.into() }
        } else {
            Self::Io(err)
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let size = Error::AlphaMapSize {
            width: 10,
            height: 20,
            size: 48,
        };
        let msg = size.to_string();
        assert!(msg.contains("10x20"));
        assert!(msg.contains("48x48"));

        let cancelled = Error::Cancelled {
            path: PathBuf::from("/out"),
        };
        assert!(cancelled.to_string().contains("/out"));

        let overwrite = Error::OverwriteSource {
            path: PathBuf::from("/in/a.png"),
        };
        assert!(overwrite.to_string().contains("overwrite"));
        assert!(!overwrite.is_cancelled());
    }

    #[test]
    fn permission_denied_becomes_cancellation() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = Error::from_write(denied, "/out");
        assert!(err.is_cancelled());

        let other = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::from_write(other, "/out");
        assert!(!err.is_cancelled());
        assert!(matches!(err, Error::Io(_)));
    }
}
