//! Interactive square cropper.
//!
//! The cropper keeps a 1:1 selection over an image that is letterboxed into
//! an on-screen container, and extracts that selection at commit time.
//!
//! # Architecture
//!
//! - [`state`]: the cropper lifecycle
//! - [`selection`]: pure drag and corner-resize gestures
//! - [`square_cropper`]: the stateful wrapper held by UI code
//! - [`data_url`]: conversion between committed crops and upload binaries
//!
//! # Usage
//!
//! ```ignore
//! use pixfit_core::cropper::{ResizeHandle, SquareCropper, to_binary_file};
//!
//! let mut cropper = SquareCropper::new();
//! cropper.init(source.natural_size(), container)?;
//! cropper.resize(dx, dy, ResizeHandle::TopLeft)?;
//! let file = to_binary_file(cropper.commit(&source)?.as_str(), "avatar.jpg")?;
//! ```

pub mod data_url;
pub mod selection;
pub mod square_cropper;
pub mod state;

pub use data_url::{DataUrl, to_binary_file, to_data_url};
pub use selection::{ResizeHandle, drag, resize};
pub use square_cropper::SquareCropper;
pub use state::CropperPhase;
