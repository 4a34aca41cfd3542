//! Coordinate and sizing math shared by the transformer and the cropper.
//!
//! Two coordinate spaces are involved:
//!
//! - **natural space**: pixels of the decoded source image
//! - **display space**: pixels of the container the image is letterboxed into
//!
//! A [`GeometryFrame`] maps between them. Everything here is pure and O(1).

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Slack used when comparing display-space coordinates.
pub const EPSILON: f64 = 1e-6;

/// Integer pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether both dimensions are within `bounds`.
    pub fn fits_within(&self, bounds: Size) -> bool {
        self.width <= bounds.width && self.height <= bounds.height
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Size {
    type Err = AppError;

    /// Parses `WIDTHxHEIGHT`, e.g. `800x600`.
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| AppError::invalid(format!("expected WIDTHxHEIGHT, got '{}'", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| AppError::invalid(format!("invalid dimension '{}': {}", v, e)))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// Letterbox-fit: the largest size within `bounds` that keeps the aspect
/// ratio of `natural`. Never upscales and never returns a zero dimension.
///
/// The ratio `min(max_w / w, max_h / h)` is resolved with integer
/// cross-multiplication so the bound that wins lands exactly on its limit.
pub fn fit_within(natural: Size, bounds: Size) -> Size {
    if natural.fits_within(bounds) {
        return natural;
    }

    let (w, h) = (natural.width as u64, natural.height as u64);
    let (max_w, max_h) = (bounds.width as u64, bounds.height as u64);

    let (width, height) = if max_w * h <= max_h * w {
        (max_w, h * max_w / w.max(1))
    } else {
        (w * max_h / h.max(1), max_h)
    };

    Size::new(width.max(1) as u32, height.max(1) as u32)
}

/// Fill-and-center-crop of a source into a square, in source pixels.
///
/// Scaling the whole source by `scale` and clipping the overflow evenly is
/// the same as resampling the centered `side x side` window up or down to
/// the target, without ever materialising the overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverPlacement {
    /// Side of the centered source window; the shorter source side.
    pub side: u32,
    /// Source columns clipped from the left.
    pub offset_x: u32,
    /// Source rows clipped from the top.
    pub offset_y: u32,
    /// `max(target / w, target / h)`: output pixels per source pixel.
    pub scale: f64,
}

/// Cover placement of `natural` behind a `target x target` square.
///
/// Small sources are upscaled.
pub fn cover_square(natural: Size, target: u32) -> CoverPlacement {
    let width = natural.width.max(1);
    let height = natural.height.max(1);
    let side = width.min(height);

    CoverPlacement {
        side,
        offset_x: (width - side) / 2,
        offset_y: (height - side) / 2,
        scale: target as f64 / side as f64,
    }
}

/// Mapping between a source image and its letterboxed display in a container.
///
/// Invariants: `display_width = natural_width * scale`,
/// `scale = min(container_w / natural_w, container_h / natural_h)`, and the
/// offsets center the displayed image inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometryFrame {
    pub natural_width: f64,
    pub natural_height: f64,
    pub display_width: f64,
    pub display_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
    pub container: Size,
}

impl GeometryFrame {
    pub fn letterbox(natural: Size, container: Size) -> Result<Self> {
        if natural.is_empty() {
            return Err(AppError::crop(format!("image has no pixels ({})", natural)));
        }
        if container.is_empty() {
            return Err(AppError::crop(format!("container has no area ({})", container)));
        }

        let natural_width = natural.width as f64;
        let natural_height = natural.height as f64;
        let container_width = container.width as f64;
        let container_height = container.height as f64;

        let scale = (container_width / natural_width).min(container_height / natural_height);
        let display_width = natural_width * scale;
        let display_height = natural_height * scale;

        Ok(Self {
            natural_width,
            natural_height,
            display_width,
            display_height,
            offset_x: (container_width - display_width) / 2.0,
            offset_y: (container_height - display_height) / 2.0,
            scale,
            container,
        })
    }

    pub fn natural_size(&self) -> Size {
        Size::new(self.natural_width as u32, self.natural_height as u32)
    }

    /// Smaller container side; the upper bound for the crop square.
    pub fn max_crop_side(&self) -> f64 {
        self.container.width.min(self.container.height) as f64
    }

    /// Clamps a left edge so a box of `side` stays within the displayed image.
    pub fn clamp_x(&self, x: f64, side: f64) -> f64 {
        clamp_axis(x, self.offset_x, self.offset_x + self.display_width - side)
    }

    /// Clamps a top edge so a box of `side` stays within the displayed image.
    pub fn clamp_y(&self, y: f64, side: f64) -> f64 {
        clamp_axis(y, self.offset_y, self.offset_y + self.display_height - side)
    }
}

/// `max(lo, min(value, hi))`; the lower bound wins when `hi < lo`.
pub fn clamp_axis(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(value.min(hi))
}

/// Square selection in display (container) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn square(x: f64, y: f64, side: f64) -> Self {
        Self {
            x,
            y,
            width: side,
            height: side,
        }
    }

    /// The centered starting selection for a frame.
    ///
    /// Side is `min(200, 0.6 * container_w, 0.6 * container_h)`, further
    /// limited to the displayed image so the default never spills into the
    /// letterbox bars.
    pub fn centered_default(frame: &GeometryFrame) -> Self {
        let container_width = frame.container.width as f64;
        let container_height = frame.container.height as f64;

        let side = 200f64
            .min(container_width * 0.6)
            .min(container_height * 0.6)
            .min(frame.display_width)
            .min(frame.display_height);

        Self::square(
            (container_width - side) / 2.0,
            (container_height - side) / 2.0,
            side,
        )
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Whether the rectangle lies within the displayed image of `frame`.
    pub fn is_contained_in(&self, frame: &GeometryFrame) -> bool {
        self.x >= frame.offset_x - EPSILON
            && self.y >= frame.offset_y - EPSILON
            && self.x + self.width <= frame.offset_x + frame.display_width + EPSILON
            && self.y + self.height <= frame.offset_y + frame.display_height + EPSILON
    }

    /// Maps the rectangle back into natural (source pixel) space.
    pub fn source_region(&self, frame: &GeometryFrame) -> SourceRegion {
        SourceRegion {
            x: (self.x - frame.offset_x) / frame.scale,
            y: (self.y - frame.offset_y) / frame.scale,
            width: self.width / frame.scale,
            height: self.height / frame.scale,
        }
    }
}

/// A sub-rectangle of the source image in natural pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRegion {
    /// Snaps to whole pixels inside `bounds`: `(x, y, width, height)`.
    ///
    /// Returns `None` when nothing of the region overlaps the image.
    pub fn to_pixels(&self, bounds: Size) -> Option<(u32, u32, u32, u32)> {
        let x = self.x.max(0.0).floor().min(bounds.width as f64) as u32;
        let y = self.y.max(0.0).floor().min(bounds.height as f64) as u32;
        let width = (self.width.round().max(1.0) as u32).min(bounds.width - x);
        let height = (self.height.round().max(1.0) as u32).min(bounds.height - y);

        (width > 0 && height > 0).then_some((x, y, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_passes_small_images_through() {
        assert_eq!(fit_within(Size::new(640, 480), Size::new(700, 700)), Size::new(640, 480));
        assert_eq!(fit_within(Size::new(700, 700), Size::new(700, 700)), Size::new(700, 700));
    }

    #[test]
    fn fit_wide_image_is_width_bound() {
        // ratio = min(700/3000, 700/1500) = 0.2333...
        assert_eq!(fit_within(Size::new(3000, 1500), Size::new(700, 700)), Size::new(700, 350));
    }

    #[test]
    fn fit_tall_image_is_height_bound() {
        assert_eq!(fit_within(Size::new(1000, 4000), Size::new(700, 700)), Size::new(175, 700));
    }

    #[test]
    fn fit_never_collapses_to_zero() {
        assert_eq!(fit_within(Size::new(10_000, 1), Size::new(700, 700)), Size::new(700, 1));
    }

    #[test]
    fn cover_landscape_clips_left_and_right() {
        // scale 0.5: the 600x300 scaled image loses 150 output px per side
        let placement = cover_square(Size::new(1200, 600), 300);
        assert_eq!((placement.side, placement.offset_x, placement.offset_y), (600, 300, 0));
        assert_eq!(placement.scale, 0.5);
    }

    #[test]
    fn cover_portrait_clips_top_and_bottom() {
        let placement = cover_square(Size::new(333, 500), 300);
        assert_eq!((placement.side, placement.offset_x, placement.offset_y), (333, 0, 83));
    }

    #[test]
    fn cover_upscales_small_sources() {
        let placement = cover_square(Size::new(100, 50), 300);
        assert_eq!((placement.side, placement.offset_x, placement.offset_y), (50, 25, 0));
        assert_eq!(placement.scale, 6.0);
    }

    #[test]
    fn cover_stays_inside_the_source_for_extreme_inputs() {
        let placement = cover_square(Size::new(1, 100_000), 70_000);
        assert_eq!(placement.side, 1);
        assert_eq!(placement.offset_x, 0);
        assert_eq!(placement.offset_y, 49_999);
        assert!(placement.offset_y + placement.side <= 100_000);
        assert_eq!(placement.scale, 70_000.0);
    }

    #[test]
    fn letterbox_exact_fit() {
        let frame = GeometryFrame::letterbox(Size::new(1600, 1200), Size::new(800, 600)).unwrap();
        assert_eq!(frame.scale, 0.5);
        assert_eq!(frame.display_width, 800.0);
        assert_eq!(frame.display_height, 600.0);
        assert_eq!(frame.offset_x, 0.0);
        assert_eq!(frame.offset_y, 0.0);
    }

    #[test]
    fn letterbox_centers_narrow_image() {
        let frame = GeometryFrame::letterbox(Size::new(600, 1200), Size::new(800, 600)).unwrap();
        assert_eq!(frame.scale, 0.5);
        assert_eq!(frame.display_width, 300.0);
        assert_eq!(frame.offset_x, 250.0);
        assert_eq!(frame.offset_y, 0.0);
    }

    #[test]
    fn letterbox_rejects_empty_inputs() {
        assert!(GeometryFrame::letterbox(Size::new(0, 10), Size::new(800, 600)).is_err());
        assert!(GeometryFrame::letterbox(Size::new(10, 10), Size::new(800, 0)).is_err());
    }

    #[test]
    fn default_crop_is_centered() {
        let frame = GeometryFrame::letterbox(Size::new(1600, 1200), Size::new(800, 600)).unwrap();
        let rect = CropRect::centered_default(&frame);
        assert_eq!(rect, CropRect::square(300.0, 200.0, 200.0));
    }

    #[test]
    fn default_crop_stays_on_a_thin_image() {
        // displayed as 800x100 in the middle of the container
        let frame = GeometryFrame::letterbox(Size::new(1600, 200), Size::new(800, 600)).unwrap();
        let rect = CropRect::centered_default(&frame);
        assert_eq!(rect.width, 100.0);
        assert!(rect.is_contained_in(&frame));
    }

    #[test]
    fn source_region_undoes_display_scale() {
        let frame = GeometryFrame::letterbox(Size::new(600, 1200), Size::new(800, 600)).unwrap();
        let region = CropRect::square(300.0, 100.0, 100.0).source_region(&frame);
        assert_eq!(region, SourceRegion { x: 100.0, y: 200.0, width: 200.0, height: 200.0 });
    }

    #[test]
    fn source_region_snaps_inside_bounds() {
        let region = SourceRegion { x: 590.4, y: -0.2, width: 20.0, height: 20.0 };
        assert_eq!(region.to_pixels(Size::new(600, 600)), Some((590, 0, 10, 20)));
    }

    #[test]
    fn size_parses_from_cli_form() {
        assert_eq!("800x600".parse::<Size>().unwrap(), Size::new(800, 600));
        assert!("800".parse::<Size>().is_err());
    }
}
