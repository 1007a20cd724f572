//! On-disk layout of a review session.
//!
//! - Image cache: `<image dir>/<item key>`
//! - Output labels: `<label dir>/<item key with extension replaced by png>`
//! - Base canvases (optional): `<canvas dir>/<item key stem>_annotate.png`
//!
//! The output file is the single artifact per item and its existence is the
//! "already reviewed" marker. Outputs are written to a temporary file, synced,
//! then renamed, so [`LabelStore::exists`] never observes a partial file.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader, ImageResult, RgbaImage};

use crate::error::{PickerError, Result};

/// Extension of every output label image.
pub const OUTPUT_EXTENSION: &str = "png";

/// Suffix appended to the key stem to find its base canvas.
pub const CANVAS_SUFFIX: &str = "_annotate.png";

/// Paths of the image cache, output labels and optional base canvases.
#[derive(Debug, Clone)]
pub struct LabelStore {
    image_dir: PathBuf,
    label_dir: PathBuf,
    canvas_dir: Option<PathBuf>,
}

impl LabelStore {
    pub fn new(image_dir: impl Into<PathBuf>, label_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            label_dir: label_dir.into(),
            canvas_dir: None,
        }
    }

    /// Read base canvases from `canvas_dir`.
    pub fn with_canvas_dir(mut self, canvas_dir: Option<PathBuf>) -> Self {
        self.canvas_dir = canvas_dir;
        self
    }

    /// Create the image and label directories if they do not exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.image_dir)?;
        fs::create_dir_all(&self.label_dir)?;
        Ok(())
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn label_dir(&self) -> &Path {
        &self.label_dir
    }

    pub fn canvas_dir(&self) -> Option<&Path> {
        self.canvas_dir.as_deref()
    }

    /// Where the source image of `key` is cached.
    pub fn source_path(&self, key: &str) -> PathBuf {
        self.image_dir.join(file_name(key))
    }

    /// Where the output label of `key` is written.
    ///
    /// Keys that only differ by extension map to the same output.
    pub fn output_path(&self, key: &str) -> PathBuf {
        let name = Path::new(file_name(key)).with_extension(OUTPUT_EXTENSION);
        self.label_dir.join(name)
    }

    /// Where the base canvas of `key` is read from, if canvases are configured.
    pub fn canvas_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.canvas_dir.as_ref()?;
        let stem = Path::new(file_name(key))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(dir.join(format!("{}{}", stem, CANVAS_SUFFIX)))
    }

    /// Whether `key` already has an output label.
    pub fn exists(&self, key: &str) -> bool {
        self.output_path(key).is_file()
    }

    /// Write the composited label of `key`.
    ///
    /// Returns once the file is durable under its final name.
    pub fn save(&self, key: &str, label: &RgbaImage) -> Result<PathBuf> {
        let path = self.output_path(key);
        let mut temp = tempfile::Builder::new()
            .prefix(".label-")
            .suffix(".part")
            .tempfile_in(&self.label_dir)?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            label.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| PickerError::Io(e.error))?;

        log::info!("💾 Saved {}", path.display());
        Ok(path)
    }

    /// Delete the output label of `key`.
    ///
    /// Returns `false` if there was nothing to delete.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.output_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("🗑️ Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the cached source image of `key`.
    ///
    /// A missing file means it vanished after the fetch worker verified it.
    pub fn load_source_image(&self, key: &str) -> Result<RgbaImage> {
        let path = self.source_path(key);
        if !path.is_file() {
            return Err(PickerError::MissingSourceImage { path });
        }
        Ok(decode_image(&path)?.to_rgba8())
    }

    /// Load the base canvas of `key` with white keyed out, if configured.
    pub fn load_canvas(&self, key: &str) -> Result<Option<RgbaImage>> {
        let Some(path) = self.canvas_path(key) else {
            return Ok(None);
        };
        let canvas = decode_image(&path)
            .map_err(|e| {
                PickerError::config(format!("Cannot read base canvas {}: {}", path.display(), e))
            })?
            .to_rgba8();
        Ok(Some(picker_raster::key_out_white(canvas)))
    }
}

/// Decode the image at `path`, detecting the format from its content.
///
/// Item keys come from URL basenames and may lack an extension or carry the
/// wrong one.
pub fn decode_image(path: &Path) -> ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Last path component of a key, guarding against keys with separators.
fn file_name(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}
