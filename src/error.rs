//! Error types for the label review pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::fetch::FetchError;

/// Errors that can occur while merging, fetching, reviewing or saving labels.
#[derive(Error, Debug)]
pub enum PickerError {
    /// Invalid or incomplete configuration (flags, color map, unreadable or
    /// malformed label files)
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Overlay rasterization error
    #[error("Raster error: {0}")]
    Raster(#[from] picker_raster::RasterError),

    /// Background fetch failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A verified source image disappeared before it could be reviewed
    #[error("Source image vanished after verification: {path:?}")]
    MissingSourceImage {
        /// Where the image was expected
        path: PathBuf,
    },

    /// The item key has no entry in the merged record
    #[error("Unknown item key: {key}")]
    UnknownItem {
        /// The key that was looked up
        key: String,
    },

    /// A selection referred to a category or candidate that does not exist
    #[error("Invalid selection: {message}")]
    InvalidSelection {
        /// Description of the rejected selection
        message: String,
    },
}

impl PickerError {
    /// Create a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid selection error with a message.
    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PickerError>;
