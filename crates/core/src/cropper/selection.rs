//! Gesture handling for the square crop selection.
//!
//! Both gestures are pure: they take the current [`CropRect`] and the
//! [`GeometryFrame`] it lives in and return the next rectangle. The result is
//! always square and always inside the displayed image.

use crate::error::AppError;
use crate::geometry::{CropRect, GeometryFrame};
use std::str::FromStr;

/// Corner handle used to resize the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ResizeHandle {
    pub fn is_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::TopRight)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        }
    }
}

impl FromStr for ResizeHandle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            other => Err(AppError::invalid(format!(
                "unknown resize handle '{}' (expected top-left, top-right, bottom-left or bottom-right)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ResizeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves the selection by `(dx, dy)`, clamped to the displayed image.
pub fn drag(rect: CropRect, frame: &GeometryFrame, dx: f64, dy: f64) -> CropRect {
    CropRect {
        x: frame.clamp_x(rect.x + dx, rect.width),
        y: frame.clamp_y(rect.y + dy, rect.height),
        ..rect
    }
}

/// Resizes the selection from a corner, keeping the opposite corner fixed.
///
/// The dominant drag axis (after flipping deltas for left/top handles) sets
/// one uniform size change. The side is clamped to
/// `[min_size, min(container_w, container_h)]`, the origin is clamped into the
/// displayed image, and the side is finally shrunk to whatever room remains
/// right and below the clamped origin.
pub fn resize(
    rect: CropRect,
    frame: &GeometryFrame,
    dx: f64,
    dy: f64,
    handle: ResizeHandle,
    min_size: f64,
) -> CropRect {
    let dx = if handle.is_left() { -dx } else { dx };
    let dy = if handle.is_top() { -dy } else { dy };
    let delta = if dx.abs() > dy.abs() { dx } else { dy };

    let mut side = min_size.max((rect.width + delta).min(frame.max_crop_side()));

    let mut x = rect.x;
    let mut y = rect.y;
    if handle.is_left() {
        x += rect.width - side;
    }
    if handle.is_top() {
        y += rect.height - side;
    }

    x = frame.clamp_x(x, side);
    y = frame.clamp_y(y, side);

    let room_x = frame.display_width - (x - frame.offset_x);
    let room_y = frame.display_height - (y - frame.offset_y);
    side = side.min(room_x).min(room_y);

    CropRect::square(x, y, side)
}
