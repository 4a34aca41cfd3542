//! Upload pipeline.
//!
//! Storage itself is an external collaborator behind the [`Uploader`] trait.
//! [`ImageUploadService`] is the single place where upload candidates are
//! validated, routed through the shared transformer with per-kind options,
//! and handed off under a generated destination key.
//!
//! | kind                          | bucket       | sizing policy          |
//! |-------------------------------|--------------|------------------------|
//! | [`UploadKind::PostImage`]     | `images`     | fit within 700x700     |
//! | [`UploadKind::TicketAttachment`] | `Ticket`  | fit within 700x700     |
//! | [`UploadKind::Avatar`]        | `UserAvatar` | 300x300 fill and crop  |

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::image_processing::{ImageProcessor, OutputBinary};
use crate::source::{InputFile, extension_of};
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

/// MIME types accepted for upload.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

/// Result reported by an upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub public_url: Option<String>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn stored(public_url: impl Into<String>) -> Self {
        Self {
            success: true,
            public_url: Some(public_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            public_url: None,
            error: Some(error.into()),
        }
    }
}

/// Storage backend that accepts finished binaries.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores `file` under `destination_key` and reports where it can be fetched.
    async fn upload(&self, file: &OutputBinary, destination_key: &str) -> UploadOutcome;
}

/// Uploader that writes into a local directory tree and serves files under a
/// public base URL. Existing objects are never overwritten.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
    public_base: Url,
}

impl LocalUploader {
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if `public_base_url` does not parse.
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let mut public_base = Url::parse(public_base_url)
            .map_err(|e| AppError::config(format!("Invalid public base URL: {}", e)))?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !public_base.path().ends_with('/') {
            let path = format!("{}/", public_base.path());
            public_base.set_path(&path);
        }
        Ok(Self {
            root: root.into(),
            public_base,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.storage_root.clone(), &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn store(&self, file: &OutputBinary, destination_key: &str) -> Result<String> {
        let relative = sanitize_key(destination_key)?;
        let path = self.root.join(&relative);

        if tokio::fs::try_exists(&path).await? {
            return Err(AppError::upload(format!("{} already exists", destination_key)));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &file.bytes).await?;

        let url = self
            .public_base
            .join(destination_key)
            .map_err(|e| AppError::upload(format!("cannot build public URL: {}", e)))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload(&self, file: &OutputBinary, destination_key: &str) -> UploadOutcome {
        match self.store(file, destination_key).await {
            Ok(url) => {
                log::info!(
                    "stored {} ({}, {} bytes) at {}",
                    file.file_name,
                    file.mime,
                    file.bytes.len(),
                    url
                );
                UploadOutcome::stored(url)
            }
            Err(e) => {
                log::error!("upload of {} failed: {}", destination_key, e);
                UploadOutcome::failed(e.to_string())
            }
        }
    }
}

fn sanitize_key(key: &str) -> Result<PathBuf> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(path.to_path_buf())
    } else {
        Err(AppError::upload(format!("unsafe destination key '{}'", key)))
    }
}

/// What an upload is for; selects the bucket and the sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    PostImage,
    TicketAttachment,
    Avatar,
}

impl UploadKind {
    pub fn bucket(self) -> &'static str {
        match self {
            Self::PostImage => "images",
            Self::TicketAttachment => "Ticket",
            Self::Avatar => "UserAvatar",
        }
    }
}

impl FromStr for UploadKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "post-image" | "image" => Ok(Self::PostImage),
            "ticket" | "ticket-attachment" | "attachment" => Ok(Self::TicketAttachment),
            "avatar" => Ok(Self::Avatar),
            other => Err(AppError::invalid(format!(
                "unknown upload kind '{}' (expected post, ticket or avatar)",
                other
            ))),
        }
    }
}

/// Validates, transforms and hands off images for every upload kind.
pub struct ImageUploadService<U> {
    config: Config,
    uploader: U,
}

impl<U: Uploader> ImageUploadService<U> {
    pub fn new(config: Config, uploader: U) -> Self {
        Self { config, uploader }
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Checks type and size limits before any decoding happens.
    pub fn validate(&self, file: &InputFile) -> Result<()> {
        if file.bytes.is_empty() {
            return Err(AppError::invalid(format!("{} is empty", file.name)));
        }
        let mime = file.mime.to_ascii_lowercase();
        if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(AppError::invalid(format!(
                "{} has unsupported type '{}' (accepted: jpg, jpeg, png, gif, webp, svg)",
                file.name, file.mime
            )));
        }
        if file.size() > self.config.max_upload_bytes {
            return Err(AppError::invalid(format!(
                "{} is {:.2}MB, the limit is {:.2}MB",
                file.name,
                file.size() as f64 / 1024.0 / 1024.0,
                self.config.max_upload_bytes as f64 / 1024.0 / 1024.0
            )));
        }
        Ok(())
    }

    /// Produces the binary that would be uploaded for `kind`.
    ///
    /// Vector images are passed through untouched for every kind. When
    /// fallback is enabled, decode and encode failures also pass the
    /// original through, with a warning.
    pub async fn prepare(&self, kind: UploadKind, file: &InputFile) -> Result<OutputBinary> {
        self.validate(file)?;

        if file.is_vector() {
            log::info!("{} is a vector image, uploading without compression", file.name);
            return Ok(OutputBinary::passthrough(file));
        }

        let transformed = match kind {
            UploadKind::PostImage | UploadKind::TicketAttachment => {
                ImageProcessor::resize_to_fit(file, &self.config.fit).await
            }
            UploadKind::Avatar => {
                ImageProcessor::resize_to_square_avatar(file, &self.config.avatar).await
            }
        };

        match transformed {
            Ok(binary) => Ok(binary),
            Err(err) if err.is_fallback_eligible() && self.config.fallback_to_original => {
                log::warn!(
                    "compression of {} failed, uploading the original instead: {}",
                    file.name,
                    err
                );
                Ok(OutputBinary::passthrough(file))
            }
            Err(err) => Err(err),
        }
    }

    /// Prepares `file` and hands it to the uploader under
    /// `<bucket>/<user hash>_<unix millis>.<ext>`.
    ///
    /// # Errors
    ///
    /// Validation and non-recoverable processing failures are returned as
    /// errors; storage failures are reported in the [`UploadOutcome`].
    pub async fn upload(
        &self,
        kind: UploadKind,
        file: &InputFile,
        user_id: &str,
    ) -> Result<UploadOutcome> {
        let binary = self.prepare(kind, file).await?;
        let key = format!(
            "{}/{}",
            kind.bucket(),
            destination_key(user_id, chrono::Utc::now().timestamp_millis(), &binary.file_name)
        );

        log::debug!(
            "uploading {} as {} ({}, {} bytes)",
            binary.file_name,
            key,
            binary.mime,
            binary.bytes.len()
        );

        Ok(self.uploader.upload(&binary, &key).await)
    }
}

/// `<sum of the user id's UTF-16 code units>_<unix millis>.<ext>`.
///
/// Keeps non-ASCII user ids out of storage paths.
pub fn destination_key(user_id: &str, unix_millis: i64, file_name: &str) -> String {
    let user_hash: u64 = user_id.encode_utf16().map(u64::from).sum();
    let ext = extension_of(file_name)
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}_{}.{}", user_hash, unix_millis, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_key_hashes_user_id() {
        // 'a' + 'b' = 97 + 98
        assert_eq!(destination_key("ab", 1_000, "x_compressed1.JPG"), "195_1000.jpg");
        assert_eq!(destination_key("", 5, "noext"), "0_5.bin");
    }

    #[test]
    fn destination_key_handles_non_ascii_ids() {
        assert_eq!(destination_key("用户", 7, "a.png"), format!("{}_7.png", 0x7528 + 0x6237));
    }

    #[test]
    fn kinds_map_to_buckets() {
        assert_eq!("post".parse::<UploadKind>().unwrap().bucket(), "images");
        assert_eq!("ticket".parse::<UploadKind>().unwrap().bucket(), "Ticket");
        assert_eq!("Avatar".parse::<UploadKind>().unwrap().bucket(), "UserAvatar");
        assert!("banner".parse::<UploadKind>().is_err());
    }

    #[test]
    fn keys_must_stay_inside_the_root() {
        assert!(sanitize_key("images/1_2.jpg").is_ok());
        assert!(sanitize_key("../escape.jpg").is_err());
        assert!(sanitize_key("/etc/passwd").is_err());
        assert!(sanitize_key("").is_err());
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let uploader = LocalUploader::new("/tmp/x", "https://cdn.example.com/public").unwrap();
        assert_eq!(
            uploader.public_base.join("images/a.jpg").unwrap().as_str(),
            "https://cdn.example.com/public/images/a.jpg"
        );
    }
}
