//! Input files and the asynchronous image decode primitive.
//!
//! An [`InputFile`] is the raw, still-encoded upload candidate (name, declared
//! MIME type and bytes). Decoding it yields a [`SourceImage`], which is
//! read-only and discarded once a transform or crop has produced its output.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::geometry::Size;
use image::{DynamicImage, GenericImageView};

/// MIME type used for vector inputs, which bypass raster processing.
pub const SVG_MIME: &str = "image/svg+xml";

/// A named, typed, still-encoded image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, sniffing its MIME type from the content and
    /// falling back to the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime = sniff_mime(&bytes, &name);

        Ok(Self { name, mime, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether this is a vector image the raster pipeline must not touch.
    pub fn is_vector(&self) -> bool {
        if self.mime.eq_ignore_ascii_case(SVG_MIME) {
            return true;
        }
        if extension_of(&self.name).is_some_and(|ext| ext.eq_ignore_ascii_case("svg")) {
            return true;
        }
        looks_like_svg(&self.bytes)
    }
}

/// A decoded raster, read-only once loaded.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    /// Decodes encoded bytes off the async executor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decode`] if the bytes are not a supported raster
    /// format or are corrupt.
    pub async fn decode(bytes: Vec<u8>) -> Result<Self> {
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| AppError::decode(format!("decode task failed: {}", e)))?
            .map_err(|e| AppError::decode(e.to_string()))?;

        let source = Self::from_image(image);
        if source.natural_size().is_empty() {
            return Err(AppError::decode("image has zero width or height"));
        }
        Ok(source)
    }

    /// Wraps an already decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn natural_size(&self) -> Size {
        let (width, height) = self.image.dimensions();
        Size::new(width, height)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Best-effort MIME detection: magic bytes first, then the file extension.
pub fn sniff_mime(bytes: &[u8], name: &str) -> String {
    // infer reports SVG documents as generic XML
    if looks_like_svg(bytes) {
        return SVG_MIME.to_string();
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    let mime = match extension_of(name).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => SVG_MIME,
        _ => "application/octet-stream",
    };
    mime.to_string()
}

pub(crate) fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn decode_reports_natural_size() {
        let source = SourceImage::decode(png_bytes(40, 30)).await.unwrap();
        assert_eq!(source.natural_size(), Size::new(40, 30));
    }

    #[tokio::test]
    async fn decode_rejects_garbage() {
        let err = SourceImage::decode(b"definitely not an image".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn sniffs_content_before_extension() {
        assert_eq!(sniff_mime(&png_bytes(2, 2), "photo.jpg"), "image/png");
        assert_eq!(sniff_mime(b"", "photo.JPEG"), "image/jpeg");
        assert_eq!(sniff_mime(b"<svg xmlns='http://www.w3.org/2000/svg'/>", "x"), SVG_MIME);
    }

    #[test]
    fn detects_vector_inputs() {
        assert!(InputFile::new("logo.svg", "", Vec::new()).is_vector());
        assert!(InputFile::new("logo", SVG_MIME, Vec::new()).is_vector());
        assert!(
            InputFile::new("logo.bin", "", b"<?xml version=\"1.0\"?><svg></svg>".to_vec())
                .is_vector()
        );
        assert!(!InputFile::new("photo.png", "image/png", png_bytes(2, 2)).is_vector());
    }

    #[test]
    fn extension_ignores_dotfiles() {
        assert_eq!(extension_of("a.b.png"), Some("png"));
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("noext"), None);
    }
}
