//! Pixfit Core Library
//!
//! This library provides the client-side image pipeline used before uploads:
//! bounded re-encoding, square avatar generation, and an interactive square
//! cropper over a letterboxed preview.
//!
//! # Overview
//!
//! Images are reduced before they leave the device. The library handles:
//!
//! - **Transformation**: fit-within resizing and cover-crop avatars via [`image_processing`]
//! - **Cropping**: a 1:1 selection with drag and corner-resize gestures via [`cropper`]
//! - **Uploads**: validation, per-kind routing and hand-off via [`upload`]
//! - **Caching**: time-limited key/value entries via [`cache`]
//!
//! # Quick Start
//!
//! The simplest way to use the library is through the [`Pixfit`] facade:
//!
//! ```ignore
//! use pixfit_core::{InputFile, Pixfit, UploadKind};
//!
//! let app = Pixfit::new()?;
//! let file = InputFile::from_path("holiday.png").await?;
//!
//! let compressed = app.fit(&file).await?;
//! let outcome = app.upload_service()?.upload(UploadKind::PostImage, &file, "user-1").await?;
//! ```
//!
//! # Module Structure
//!
//! - [`cache`]: Expiring key/value cache
//! - [`config`]: Configuration loading and management
//! - [`cropper`]: Interactive square cropper
//! - [`error`]: Error types and result aliases
//! - [`geometry`]: Size math and the display/natural coordinate mapping
//! - [`image_processing`]: Resizing and encoding
//! - [`source`]: Input files and decoded images
//! - [`upload`]: Upload pipeline and storage collaborators

pub mod cache;
pub mod config;
pub mod cropper;
pub mod error;
pub mod geometry;
pub mod image_processing;
pub mod source;
pub mod upload;

// Re-export primary types for convenience
pub use config::Config;
pub use cropper::{ResizeHandle, SquareCropper};
pub use error::{AppError, Result};
pub use geometry::{CropRect, Size};
pub use image_processing::{ImageProcessor, OutputBinary, OutputFormat};
pub use source::{InputFile, SourceImage};
pub use upload::{ImageUploadService, LocalUploader, UploadKind, UploadOutcome, Uploader};

/// Main entry point for the Pixfit pipeline.
///
/// Holds the resolved [`Config`] and hands out the configured pieces.
///
/// # Example
///
/// ```ignore
/// use pixfit_core::Pixfit;
///
/// let app = Pixfit::new()?;
/// let avatar = app.avatar(&file).await?;
/// ```
pub struct Pixfit {
    config: Config,
}

impl Pixfit {
    /// Creates an instance from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a `PIXFIT_*` variable holds an invalid value.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config: Config::load()?,
        })
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Re-encodes `file` within the configured bounding box.
    pub async fn fit(&self, file: &InputFile) -> Result<OutputBinary> {
        ImageProcessor::resize_to_fit(file, &self.config.fit).await
    }

    /// Produces the configured square avatar from `file`.
    pub async fn avatar(&self, file: &InputFile) -> Result<OutputBinary> {
        ImageProcessor::resize_to_square_avatar(file, &self.config.avatar).await
    }

    /// A fresh cropper using the configured minimum selection size.
    pub fn cropper(&self) -> SquareCropper {
        SquareCropper::with_min_size(self.config.min_crop_size)
    }

    /// Upload service backed by the configured local storage root.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the public base URL is invalid.
    pub fn upload_service(&self) -> Result<ImageUploadService<LocalUploader>> {
        let uploader = LocalUploader::from_config(&self.config)?;
        Ok(ImageUploadService::new(self.config.clone(), uploader))
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}

/// Loads `.env` files if present.
///
/// Call this once at application startup before [`Config::load`].
pub fn init() {
    let _ = dotenvy::dotenv();
}
