//! Pixel operations for the label picker.
//!
//! Polygon rings are rasterized into straight-alpha RGBA overlays with
//! `tiny-skia`, then stacked with `image`'s source-over compositing.

pub mod compose;
pub mod error;
pub mod rasterizer;
pub mod ring;

pub use compose::{composite, composite_onto, key_out_white, scale_to_height};
pub use error::{RasterError, Result};
pub use rasterizer::Rasterizer;
pub use ring::Ring;

/// Straight-alpha RGBA color used for overlay fills.
pub type FillColor = image::Rgba<u8>;
