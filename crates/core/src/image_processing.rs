//! Resize-and-encode transformer.
//!
//! This module turns an arbitrary input image into a bounded, re-encoded
//! binary ready for upload. Two sizing policies share the same decode and
//! encode stages:
//!
//! - **fit-within** ([`ImageProcessor::resize_to_fit`]): letterbox scale into
//!   `max_width x max_height`, never upscaling. Used for post and ticket images.
//! - **fill-and-center-crop** ([`ImageProcessor::resize_to_square_avatar`]):
//!   cover-scale the image over a `target x target` square and clip the
//!   overflow evenly. Used for avatars.
//!
//! Decoding and encoding run on the blocking pool; callers just await.

use crate::error::{AppError, Result};
use crate::geometry::{Size, cover_square, fit_within};
use crate::source::{InputFile, SourceImage, extension_of};
use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageBuffer, ImageFormat, Rgba};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::FromStr;

/// Default encoder quality shared by every policy.
pub const DEFAULT_QUALITY: f32 = 0.82;

/// Largest accepted avatar side.
pub const MAX_AVATAR_SIZE: u32 = 4096;

/// Encoded output format.
///
/// Only JPEG honours `quality`; PNG and WebP are written losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    #[serde(rename = "webp")]
    WebP,
}

impl OutputFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// Whether a file with the given MIME type is already in this format.
    pub fn matches_mime(self, mime: &str) -> bool {
        match self {
            Self::Jpeg => mime.eq_ignore_ascii_case("image/jpeg") || mime.eq_ignore_ascii_case("image/jpg"),
            _ => mime.eq_ignore_ascii_case(self.mime()),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "png" | "image/png" => Ok(Self::Png),
            "webp" | "image/webp" => Ok(Self::WebP),
            other => Err(AppError::invalid(format!(
                "unknown output format '{}' (expected jpeg, png or webp)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Options for the fit-within policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality in `(0.0, 1.0]`.
    pub quality: f32,
    pub format: OutputFormat,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_width: 700,
            max_height: 700,
            quality: DEFAULT_QUALITY,
            format: OutputFormat::Jpeg,
        }
    }
}

impl FitOptions {
    pub fn bounds(&self) -> Size {
        Size::new(self.max_width, self.max_height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bounds().is_empty() {
            return Err(AppError::config(format!(
                "fit bounds must be non-zero, got {}",
                self.bounds()
            )));
        }
        validate_quality(self.quality)
    }
}

/// Options for the fill-and-center-crop avatar policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarOptions {
    pub target_size: u32,
    /// Encoder quality in `(0.0, 1.0]`.
    pub quality: f32,
    pub format: OutputFormat,
}

impl Default for AvatarOptions {
    fn default() -> Self {
        Self {
            target_size: 300,
            quality: DEFAULT_QUALITY,
            format: OutputFormat::Jpeg,
        }
    }
}

impl AvatarOptions {
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 || self.target_size > MAX_AVATAR_SIZE {
            return Err(AppError::config(format!(
                "avatar target size must be within 1..={}, got {}",
                MAX_AVATAR_SIZE, self.target_size
            )));
        }
        validate_quality(self.quality)
    }
}

fn validate_quality(quality: f32) -> Result<()> {
    if quality.is_finite() && quality > 0.0 && quality <= 1.0 {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "quality must be within (0.0, 1.0], got {}",
            quality
        )))
    }
}

/// Final encoded result: a named, typed byte buffer owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinary {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl OutputBinary {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Wraps an untouched input so it can flow through the upload path.
    pub fn passthrough(file: &InputFile) -> Self {
        Self {
            file_name: file.name.clone(),
            mime: file.mime.clone(),
            bytes: file.bytes.clone(),
        }
    }
}

/// The shared transformer behind every upload kind.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Scales an image to fit within the configured bounds and re-encodes it.
    ///
    /// Images already within bounds keep their natural size.
    ///
    /// # Errors
    ///
    /// - [`AppError::UnsupportedFormat`] for vector inputs
    /// - [`AppError::Decode`] if the input cannot be decoded
    /// - [`AppError::Encoding`] if encoding yields no data
    pub async fn resize_to_fit(file: &InputFile, options: &FitOptions) -> Result<OutputBinary> {
        options.validate()?;
        let source = Self::decode_raster(file).await?;
        let natural = source.natural_size();
        let target = fit_within(natural, options.bounds());
        let untouched = target == natural;

        log::debug!(
            "fit {} {} into {} -> {}",
            file.name,
            natural,
            options.bounds(),
            target
        );

        let options = *options;
        let bytes = run_blocking(move || {
            let rendered = Self::render_fit(source.image(), options.bounds());
            Self::encode(&rendered, options.format, options.quality)
        })
        .await?;

        Ok(Self::finish(file, bytes, options.format, untouched, target))
    }

    /// Scales an image to cover a square and clips the overflow evenly.
    ///
    /// The output is always exactly `target_size x target_size`.
    ///
    /// # Errors
    ///
    /// Same contract as [`ImageProcessor::resize_to_fit`].
    pub async fn resize_to_square_avatar(
        file: &InputFile,
        options: &AvatarOptions,
    ) -> Result<OutputBinary> {
        options.validate()?;
        let source = Self::decode_raster(file).await?;
        let natural = source.natural_size();
        let target = Size::new(options.target_size, options.target_size);
        let untouched = natural == target;

        let options = *options;
        let bytes = run_blocking(move || {
            let rendered = Self::render_square_avatar(source.image(), options.target_size);
            Self::encode(&rendered, options.format, options.quality)
        })
        .await?;

        Ok(Self::finish(file, bytes, options.format, untouched, target))
    }

    /// Renders `image` letterboxed into `bounds` (no upscaling).
    pub fn render_fit(image: &DynamicImage, bounds: Size) -> DynamicImage {
        let natural = Size::new(image.width(), image.height());
        let target = fit_within(natural, bounds);
        Self::resample(image, target)
    }

    /// Renders `image` into a `target x target` viewport over the
    /// cover-scaled, centered source.
    ///
    /// Only the visible source window is resampled, so memory is bounded by
    /// the source and the output whatever the aspect ratio.
    pub fn render_square_avatar(image: &DynamicImage, target: u32) -> DynamicImage {
        let natural = Size::new(image.width(), image.height());
        let placement = cover_square(natural, target);
        let window = image.crop_imm(
            placement.offset_x,
            placement.offset_y,
            placement.side,
            placement.side,
        );
        Self::resample(&window, Size::new(target, target))
    }

    /// Encodes an image. JPEG output uses `quality`, other formats ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Encoding`] if the encoder fails or writes nothing.
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent(quality));
                encoder
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                    .map_err(|e| AppError::encoding(format!("JPEG encoder failed: {}", e)))?;
            }
            OutputFormat::Png | OutputFormat::WebP => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_to(&mut Cursor::new(&mut buffer), format.image_format())
                    .map_err(|e| AppError::encoding(format!("{} encoder failed: {}", format, e)))?;
            }
        }

        if buffer.is_empty() {
            return Err(AppError::encoding("encoder produced no data"));
        }
        Ok(buffer)
    }

    /// High-quality resample to exactly `target`.
    ///
    /// Uses `fast_image_resize` with Lanczos3 and falls back to
    /// `image::imageops` if the fast path rejects the buffers.
    pub fn resample(image: &DynamicImage, target: Size) -> DynamicImage {
        if image.width() == target.width && image.height() == target.height {
            return image.clone();
        }

        match Self::resample_fast(image, target) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("fast resize failed, falling back to imageops: {}", err);
                image.resize_exact(target.width, target.height, FilterType::Lanczos3)
            }
        }
    }

    fn resample_fast(image: &DynamicImage, target: Size) -> Result<DynamicImage> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image =
            fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
                .map_err(|e| AppError::encoding(format!("source buffer rejected: {}", e)))?;
        let mut dst_image = fr::images::Image::new(target.width, target.height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| AppError::encoding(format!("resize failed: {}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target.width,
            target.height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| AppError::encoding("resized buffer has unexpected length"))?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    async fn decode_raster(file: &InputFile) -> Result<SourceImage> {
        if file.is_vector() {
            return Err(AppError::UnsupportedFormat(format!(
                "{} is a vector image",
                file.name
            )));
        }
        SourceImage::decode(file.bytes.clone()).await
    }

    /// Names the output and applies the never-grow rule: an unscaled source
    /// already in the output format keeps its bytes when re-encoding would
    /// make it larger.
    fn finish(
        file: &InputFile,
        encoded: Vec<u8>,
        format: OutputFormat,
        untouched: bool,
        dimensions: Size,
    ) -> OutputBinary {
        let bytes = if untouched && format.matches_mime(&file.mime) && encoded.len() > file.bytes.len() {
            log::debug!(
                "re-encoding {} would grow it ({} > {} bytes), keeping original bytes",
                file.name,
                encoded.len(),
                file.bytes.len()
            );
            file.bytes.clone()
        } else {
            encoded
        };

        log::info!(
            "compressed {}: {:.2}KB -> {:.2}KB ({})",
            file.name,
            file.bytes.len() as f64 / 1024.0,
            bytes.len() as f64 / 1024.0,
            dimensions
        );

        OutputBinary {
            file_name: compressed_file_name(&file.name, format, chrono::Utc::now().timestamp_millis()),
            mime: format.mime().to_string(),
            bytes,
        }
    }
}

/// `<stem>_compressed<unix_millis>.<ext>`, with the output format's extension.
pub fn compressed_file_name(original: &str, format: OutputFormat, unix_millis: i64) -> String {
    let stem = match extension_of(original) {
        Some(ext) => &original[..original.len() - ext.len() - 1],
        None => original,
    };
    format!("{}_compressed{}.{}", stem, unix_millis, format.extension())
}

/// Maps `(0.0, 1.0]` onto the JPEG encoder's 1..=100 scale.
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::encoding(format!("render task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn encoded_input(name: &str, image: &DynamicImage, format: OutputFormat) -> InputFile {
        let bytes = ImageProcessor::encode(image, format, 0.9).unwrap();
        InputFile::new(name, format.mime(), bytes)
    }

    #[test]
    fn render_fit_scales_down_wide_images() {
        let out = ImageProcessor::render_fit(&gradient(1500, 750), Size::new(700, 700));
        assert_eq!((out.width(), out.height()), (700, 350));
    }

    #[test]
    fn render_fit_never_upscales() {
        let out = ImageProcessor::render_fit(&gradient(120, 80), Size::new(700, 700));
        assert_eq!((out.width(), out.height()), (120, 80));
    }

    #[test]
    fn avatar_is_exactly_target_for_any_aspect() {
        for (w, h) in [(1200, 600), (333, 500), (50, 40), (300, 300), (3, 90)] {
            let out = ImageProcessor::render_square_avatar(&gradient(w, h), 300);
            assert_eq!((out.width(), out.height()), (300, 300), "input {}x{}", w, h);
        }
    }

    #[test]
    fn avatar_of_a_sliver_only_resamples_the_visible_window() {
        let sliver = gradient(2, 20_000);
        assert_eq!(cover_square(Size::new(2, 20_000), 300).side, 2);

        let out = ImageProcessor::render_square_avatar(&sliver, 300);
        assert_eq!((out.width(), out.height()), (300, 300));
    }

    #[test]
    fn avatar_size_is_bounded() {
        let mut options = AvatarOptions::default();
        options.target_size = MAX_AVATAR_SIZE;
        assert!(options.validate().is_ok());
        options.target_size = MAX_AVATAR_SIZE + 1;
        assert!(matches!(options.validate(), Err(AppError::Config(_))));
        options.target_size = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn avatar_keeps_the_center_of_the_source() {
        // left third red, middle third green, right third blue
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(900, 300, |x, _| match x / 300 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        }));
        let out = ImageProcessor::render_square_avatar(&img, 300).to_rgb8();
        let center = out.get_pixel(150, 150);
        assert!(center[1] > 200 && center[0] < 50 && center[2] < 50, "{:?}", center);
    }

    #[test]
    fn encode_writes_each_format() {
        let img = gradient(16, 16);
        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP] {
            let bytes = ImageProcessor::encode(&img, format, DEFAULT_QUALITY).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), format.image_format());
        }
    }

    #[test]
    fn lower_quality_makes_smaller_jpeg() {
        let img = gradient(128, 128);
        let high = ImageProcessor::encode(&img, OutputFormat::Jpeg, 0.95).unwrap();
        let low = ImageProcessor::encode(&img, OutputFormat::Jpeg, 0.2).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn quality_maps_to_percent() {
        assert_eq!(quality_percent(0.82), 82);
        assert_eq!(quality_percent(1.0), 100);
        assert_eq!(quality_percent(0.001), 1);
    }

    #[test]
    fn compressed_name_inserts_suffix() {
        assert_eq!(
            compressed_file_name("holiday.photo.PNG", OutputFormat::Jpeg, 1_700_000_000_000),
            "holiday.photo_compressed1700000000000.jpg"
        );
        assert_eq!(
            compressed_file_name("avatar", OutputFormat::WebP, 42),
            "avatar_compressed42.webp"
        );
    }

    #[test]
    fn format_parses_names_and_mime_types() {
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("image/webp".parse::<OutputFormat>().unwrap(), OutputFormat::WebP);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert!(OutputFormat::Jpeg.matches_mime("image/jpg"));
    }

    #[tokio::test]
    async fn resize_to_fit_bounds_output() {
        let input = encoded_input("wide.png", &gradient(1500, 750), OutputFormat::Png);
        let out = ImageProcessor::resize_to_fit(&input, &FitOptions::default())
            .await
            .unwrap();

        assert_eq!(out.mime, "image/jpeg");
        assert!(out.file_name.starts_with("wide_compressed"));
        assert!(out.file_name.ends_with(".jpg"));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (700, 350));
    }

    #[tokio::test]
    async fn resize_to_square_avatar_outputs_target() {
        let input = encoded_input("me.png", &gradient(640, 480), OutputFormat::Png);
        let out = ImageProcessor::resize_to_square_avatar(&input, &AvatarOptions::default())
            .await
            .unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 300));
    }

    #[tokio::test]
    async fn recompression_does_not_grow() {
        let input = encoded_input("big.png", &gradient(900, 600), OutputFormat::Png);
        let options = FitOptions::default();

        let first = ImageProcessor::resize_to_fit(&input, &options).await.unwrap();
        let again = InputFile::new(first.file_name.clone(), first.mime.clone(), first.bytes.clone());
        let second = ImageProcessor::resize_to_fit(&again, &options).await.unwrap();

        assert!(second.size() <= first.size());
    }

    #[tokio::test]
    async fn vector_inputs_are_unsupported() {
        let svg = InputFile::new("logo.svg", "image/svg+xml", b"<svg></svg>".to_vec());
        let err = ImageProcessor::resize_to_fit(&svg, &FitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn corrupt_input_is_a_decode_error() {
        let broken = InputFile::new("broken.jpg", "image/jpeg", vec![0xFF, 0xD8, 0x00, 0x01]);
        let err = ImageProcessor::resize_to_square_avatar(&broken, &AvatarOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }
}
