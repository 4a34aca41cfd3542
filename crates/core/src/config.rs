use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::image_processing::{AvatarOptions, FitOptions, OutputFormat};
use directories::ProjectDirs;
use dotenvy::dotenv;

/// Default smallest side of the interactive crop square, in display pixels.
pub const DEFAULT_MIN_CROP_SIZE: f64 = 50.0;

/// Default upper bound for files accepted by the upload pipeline (15 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 15 * 1024 * 1024;

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost/storage/v1/object/public/";

#[derive(Clone, Debug)]
pub struct Config {
    pub fit: FitOptions,
    pub avatar: AvatarOptions,
    pub min_crop_size: f64,
    pub max_upload_bytes: u64,
    /// Upload the untouched original when decoding or encoding fails.
    pub fallback_to_original: bool,
    pub storage_root: PathBuf,
    pub public_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            avatar: AvatarOptions::default(),
            min_crop_size: DEFAULT_MIN_CROP_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fallback_to_original: true,
            storage_root: default_storage_root(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let mut builder = Self::builder();

        if let Some(width) = env_parse::<u32>("PIXFIT_MAX_WIDTH")? {
            builder = builder.with_max_width(width);
        }
        if let Some(height) = env_parse::<u32>("PIXFIT_MAX_HEIGHT")? {
            builder = builder.with_max_height(height);
        }
        if let Some(size) = env_parse::<u32>("PIXFIT_AVATAR_SIZE")? {
            builder = builder.with_avatar_size(size);
        }
        if let Some(quality) = env_parse::<f32>("PIXFIT_QUALITY")? {
            builder = builder.with_quality(quality);
        }
        if let Some(format) = env_parse::<OutputFormat>("PIXFIT_FORMAT")? {
            builder = builder.with_format(format);
        }
        if let Some(min) = env_parse::<f64>("PIXFIT_MIN_CROP_SIZE")? {
            builder = builder.with_min_crop_size(min);
        }
        if let Some(max) = env_parse::<u64>("PIXFIT_MAX_UPLOAD_BYTES")? {
            builder = builder.with_max_upload_bytes(max);
        }
        if let Some(fallback) = env_parse::<bool>("PIXFIT_FALLBACK_TO_ORIGINAL")? {
            builder = builder.with_fallback_to_original(fallback);
        }
        if let Ok(root) = env::var("PIXFIT_STORAGE_ROOT") {
            builder = builder.with_storage_root(root);
        }
        if let Ok(url) = env::var("PIXFIT_PUBLIC_BASE_URL") {
            builder = builder.with_public_base_url(url);
        }

        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Fluent builder over [`Config`], validated on [`ConfigBuilder::build`].
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.config.fit.max_width = width;
        self
    }

    pub fn with_max_height(mut self, height: u32) -> Self {
        self.config.fit.max_height = height;
        self
    }

    pub fn with_avatar_size(mut self, size: u32) -> Self {
        self.config.avatar.target_size = size;
        self
    }

    /// Sets the encoder quality for both sizing policies.
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.config.fit.quality = quality;
        self.config.avatar.quality = quality;
        self
    }

    /// Sets the output format for both sizing policies.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.config.fit.format = format;
        self.config.avatar.format = format;
        self
    }

    pub fn with_min_crop_size(mut self, size: f64) -> Self {
        self.config.min_crop_size = size;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn with_fallback_to_original(mut self, enabled: bool) -> Self {
        self.config.fallback_to_original = enabled;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_base_url = url.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        let config = self.config;

        config.fit.validate()?;
        config.avatar.validate()?;

        if !(config.min_crop_size.is_finite() && config.min_crop_size > 0.0) {
            return Err(AppError::config(format!(
                "min crop size must be positive, got {}",
                config.min_crop_size
            )));
        }
        if config.max_upload_bytes == 0 {
            return Err(AppError::config("max upload size must be greater than zero"));
        }
        url::Url::parse(&config.public_base_url).map_err(|e| {
            AppError::config(format!(
                "Invalid public base URL '{}': {}",
                config.public_base_url, e
            ))
        })?;

        Ok(config)
    }
}

fn default_storage_root() -> PathBuf {
    ProjectDirs::from("", "pixfit", "pixfit")
        .map(|dirs| dirs.data_dir().join("uploads"))
        .unwrap_or_else(|| PathBuf::from("uploads"))
}

/// Reads and parses an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::config(format!("{} has an invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
