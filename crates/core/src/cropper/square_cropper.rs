//! Stateful square cropper.
//!
//! `SquareCropper` is the thin wrapper UI code holds on to: it owns the
//! [`CropperPhase`] and forwards gestures to the pure functions in
//! [`super::selection`].

use super::data_url::{DataUrl, to_data_url};
use super::selection::{self, ResizeHandle};
use super::state::CropperPhase;
use crate::config::DEFAULT_MIN_CROP_SIZE;
use crate::error::{AppError, Result};
use crate::geometry::{CropRect, GeometryFrame, Size};
use crate::image_processing::{DEFAULT_QUALITY, ImageProcessor, OutputFormat};
use crate::source::SourceImage;

/// Interactive 1:1 selection over a letterboxed image.
///
/// # Example
///
/// ```ignore
/// let mut cropper = SquareCropper::new();
/// cropper.init(source.natural_size(), Size::new(800, 600))?;
/// cropper.drag(-20.0, 15.0)?;
/// cropper.resize(40.0, 0.0, ResizeHandle::BottomRight)?;
/// let data_url = cropper.commit(&source)?;
/// let file = to_binary_file(data_url.as_str(), "avatar.jpg")?;
/// ```
#[derive(Debug, Clone)]
pub struct SquareCropper {
    phase: CropperPhase,
    min_size: f64,
}

impl Default for SquareCropper {
    fn default() -> Self {
        Self::new()
    }
}

impl SquareCropper {
    pub fn new() -> Self {
        Self::with_min_size(DEFAULT_MIN_CROP_SIZE)
    }

    /// Creates a cropper whose selection never shrinks below `min_size`
    /// display pixels (unless the displayed image itself is smaller).
    pub fn with_min_size(min_size: f64) -> Self {
        Self {
            phase: CropperPhase::Uninitialized,
            min_size,
        }
    }

    /// Measures the image inside its container and places the default
    /// centered selection. Valid from any phase.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Crop`] if the image or the container has no area.
    pub fn init(&mut self, natural: Size, container: Size) -> Result<CropRect> {
        let frame = GeometryFrame::letterbox(natural, container)?;
        let rect = CropRect::centered_default(&frame);

        log::debug!(
            "cropper init: image {} in container {} (scale {:.4}), selection {:.1} at ({:.1}, {:.1})",
            natural,
            container,
            frame.scale,
            rect.width,
            rect.x,
            rect.y
        );

        self.phase = CropperPhase::Ready { frame, rect };
        Ok(rect)
    }

    /// Restores the default centered selection without re-measuring.
    pub fn reset(&mut self) -> Result<CropRect> {
        self.update(|frame, _, _| CropRect::centered_default(frame))
    }

    /// Moves the selection by a pointer delta.
    pub fn drag(&mut self, dx: f64, dy: f64) -> Result<CropRect> {
        self.update(|frame, rect, _| selection::drag(rect, frame, dx, dy))
    }

    /// Resizes the selection from a corner handle by a pointer delta.
    pub fn resize(&mut self, dx: f64, dy: f64, handle: ResizeHandle) -> Result<CropRect> {
        self.update(|frame, rect, min_size| selection::resize(rect, frame, dx, dy, handle, min_size))
    }

    /// Extracts the selection from `image` as a JPEG data URL.
    ///
    /// The output is square, sized to the selection's display side, and
    /// encoded at the default quality. The cropper becomes `Committed`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Crop`] when the cropper is not ready, when `image`
    /// is not the image it was initialised for, or when the selection misses
    /// the image; [`AppError::Encoding`] if the JPEG encoder fails.
    pub fn commit(&mut self, image: &SourceImage) -> Result<DataUrl> {
        let (frame, rect) = match &self.phase {
            CropperPhase::Ready { frame, rect } => (*frame, *rect),
            other => {
                return Err(AppError::crop(format!(
                    "cannot commit while {}",
                    other.name()
                )));
            }
        };

        let natural = image.natural_size();
        if natural != frame.natural_size() {
            return Err(AppError::crop(format!(
                "image is {} but the cropper was initialised for {}",
                natural,
                frame.natural_size()
            )));
        }

        let (x, y, width, height) = rect
            .source_region(&frame)
            .to_pixels(natural)
            .ok_or_else(|| AppError::crop("selection does not overlap the image"))?;

        let side = (rect.width.floor() as u32).max(1);
        let region = image.image().crop_imm(x, y, width, height);
        let rendered = ImageProcessor::resample(&region, Size::new(side, side));
        let bytes = ImageProcessor::encode(&rendered, OutputFormat::Jpeg, DEFAULT_QUALITY)?;

        log::debug!(
            "cropper commit: source region {}x{} at ({}, {}) -> {}x{} JPEG, {} bytes",
            width,
            height,
            x,
            y,
            side,
            side,
            bytes.len()
        );

        self.phase = CropperPhase::Committed { rect };
        Ok(to_data_url(&bytes, OutputFormat::Jpeg.mime()))
    }

    /// Current selection, if the cropper has one.
    pub fn crop_rect(&self) -> Option<CropRect> {
        match &self.phase {
            CropperPhase::Ready { rect, .. } | CropperPhase::Committed { rect } => Some(*rect),
            CropperPhase::Uninitialized => None,
        }
    }

    pub fn frame(&self) -> Option<&GeometryFrame> {
        match &self.phase {
            CropperPhase::Ready { frame, .. } => Some(frame),
            _ => None,
        }
    }

    pub fn phase(&self) -> &CropperPhase {
        &self.phase
    }

    fn update<F>(&mut self, gesture: F) -> Result<CropRect>
    where
        F: FnOnce(&GeometryFrame, CropRect, f64) -> CropRect,
    {
        match &mut self.phase {
            CropperPhase::Ready { frame, rect } => {
                *rect = gesture(frame, *rect, self.min_size);
                Ok(*rect)
            }
            other => Err(AppError::crop(format!(
                "gesture rejected while {}",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cropper::to_binary_file;
    use image::{DynamicImage, Rgb, RgbImage};

    fn quadrants(width: u32, height: u32) -> SourceImage {
        // red top-left quadrant, blue elsewhere
        SourceImage::from_image(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if x < width / 2 && y < height / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })))
    }

    #[test]
    fn gestures_require_init() {
        let mut cropper = SquareCropper::new();
        assert!(matches!(cropper.drag(1.0, 1.0), Err(AppError::Crop(_))));
        assert!(matches!(
            cropper.resize(1.0, 1.0, ResizeHandle::TopLeft),
            Err(AppError::Crop(_))
        ));
        assert!(matches!(cropper.reset(), Err(AppError::Crop(_))));
        assert!(cropper.crop_rect().is_none());
    }

    #[test]
    fn reset_restores_default_without_remeasuring() {
        let mut cropper = SquareCropper::new();
        let initial = cropper.init(Size::new(1600, 1200), Size::new(800, 600)).unwrap();
        cropper.drag(-120.0, 33.0).unwrap();
        cropper.resize(10.0, 0.0, ResizeHandle::BottomRight).unwrap();

        assert_eq!(cropper.reset().unwrap(), initial);
        assert_eq!(cropper.frame().unwrap().scale, 0.5);
    }

    #[test]
    fn commit_extracts_the_selected_region() {
        let source = quadrants(1600, 1200);
        let mut cropper = SquareCropper::new();
        cropper.init(source.natural_size(), Size::new(800, 600)).unwrap();
        // move the 200px selection into the red quadrant (display 0..400 x 0..300)
        cropper.drag(-1000.0, -1000.0).unwrap();

        let url = cropper.commit(&source).unwrap();
        assert_eq!(url.mime(), Some("image/jpeg"));

        let file = to_binary_file(url.as_str(), "crop.jpg").unwrap();
        let decoded = image::load_from_memory(&file.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (200, 200));
        let pixel = decoded.get_pixel(100, 100);
        assert!(pixel[0] > 200 && pixel[2] < 60, "{:?}", pixel);
    }

    #[test]
    fn commit_is_terminal() {
        let source = quadrants(400, 400);
        let mut cropper = SquareCropper::new();
        cropper.init(source.natural_size(), Size::new(400, 400)).unwrap();
        cropper.commit(&source).unwrap();

        assert_eq!(cropper.phase().name(), "committed");
        assert!(cropper.drag(1.0, 0.0).is_err());
        assert!(matches!(cropper.commit(&source), Err(AppError::Crop(_))));

        // a fresh init makes the instance reusable
        cropper.init(source.natural_size(), Size::new(400, 400)).unwrap();
        assert!(cropper.commit(&source).is_ok());
    }

    #[test]
    fn commit_rejects_a_different_image() {
        let mut cropper = SquareCropper::new();
        cropper.init(Size::new(1600, 1200), Size::new(800, 600)).unwrap();
        let err = cropper.commit(&quadrants(100, 100)).unwrap_err();
        assert!(matches!(err, AppError::Crop(_)));
        assert_eq!(cropper.phase().name(), "ready");
    }

    #[test]
    fn commit_before_init_fails() {
        let mut cropper = SquareCropper::new();
        assert!(matches!(cropper.commit(&quadrants(10, 10)), Err(AppError::Crop(_))));
    }
}
