//! Error types for the pixfit-core library.
//!
//! This module provides granular error variants for the different failure
//! modes of the image pipeline, so callers can decide per variant whether to
//! abort, fall back to the original file, or report a programming error.

use thiserror::Error;

/// Errors that can occur within the pixfit-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// The input could not be decoded as a raster image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Rendering or encoding produced no usable output.
    #[error("Failed to encode image: {0}")]
    Encoding(String),

    /// The input is in a format the raster pipeline does not handle (e.g. SVG).
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The cropper was used out of order or with a mismatched image.
    #[error("Crop failed: {0}")]
    Crop(String),

    /// The caller supplied an input that fails validation (type, size, dimensions).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration-related errors (unparsable values, out of range settings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upload collaborator rejected or failed to store the binary.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates a crop error with the given message.
    pub fn crop(msg: impl Into<String>) -> Self {
        Self::Crop(msg.into())
    }

    /// Creates an input validation error with the given message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an upload error with the given message.
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Whether the upload pipeline may continue with the unprocessed original
    /// after this error.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Encoding(_))
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
