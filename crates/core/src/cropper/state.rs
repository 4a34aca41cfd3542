//! Cropper lifecycle.

use crate::geometry::{CropRect, GeometryFrame};

/// Current phase of a [`super::SquareCropper`].
///
/// The cropper follows a simple state machine:
/// `Uninitialized` -> `Ready` (on init) -> `Ready` (drag / resize / reset)
/// -> `Committed` (on commit). A committed cropper needs a new `init`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CropperPhase {
    /// No image has been measured yet.
    #[default]
    Uninitialized,
    /// Gestures are accepted.
    Ready {
        /// Display mapping computed at init.
        frame: GeometryFrame,
        /// Current selection in container coordinates.
        rect: CropRect,
    },
    /// The selection was extracted; terminal until the next init.
    Committed {
        /// The selection that was committed.
        rect: CropRect,
    },
}

impl CropperPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready { .. } => "ready",
            Self::Committed { .. } => "committed",
        }
    }
}
