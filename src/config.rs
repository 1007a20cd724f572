//! Configuration for a review session.
//!
//! Settings come from command-line flags and, optionally, a JSON config file
//! with the same fields. Flags always take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use image::Rgba;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PickerError, Result};
use crate::fetch::{FetchOptions, UrlFetcher};
use crate::store::LabelStore;

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Default preview height in pixels.
pub const DEFAULT_LABEL_SCALE: u32 = 256;

/// Default wait after the category coverage warning.
pub const DEFAULT_COVERAGE_DELAY: Duration = Duration::from_secs(10);

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Fill color per label category.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorMap {
    colors: IndexMap<String, Rgba<u8>>,
}

impl ColorMap {
    /// Parse the command-line form, e.g. `{'claw': '255, 0, 0', 'truck': '0, 255, 0'}`.
    ///
    /// Single quotes are accepted in place of double quotes. Each value is
    /// `R, G, B` (opaque) or `R, G, B, A`.
    pub fn parse(spec: &str) -> Result<Self> {
        let json = spec.replace('\'', "\"");
        let pairs: IndexMap<String, String> = serde_json::from_str(&json)
            .map_err(|e| PickerError::config(format!("Invalid color map {:?}: {}", spec, e)))?;
        Self::from_pairs(pairs)
    }

    /// Build from category → `"R, G, B[, A]"` pairs.
    pub fn from_pairs(pairs: IndexMap<String, String>) -> Result<Self> {
        let colors: IndexMap<String, Rgba<u8>> = pairs
            .into_iter()
            .map(|(category, value)| Ok((category, parse_color(&value)?)))
            .collect::<Result<_>>()?;
        Ok(Self { colors })
    }

    pub fn insert(&mut self, category: impl Into<String>, color: Rgba<u8>) {
        self.colors.insert(category.into(), color);
    }

    pub fn get(&self, category: &str) -> Option<Rgba<u8>> {
        self.colors.get(category).copied()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.colors.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Parse `"R, G, B"` or `"R, G, B, A"` with components in `0..=255`.
pub fn parse_color(value: &str) -> Result<Rgba<u8>> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PickerError::config(format!("Not a valid color {:?}: {}", value, e)))?;

    match parts.as_slice() {
        [r, g, b] => Ok(Rgba([*r, *g, *b, 255])),
        [r, g, b, a] => Ok(Rgba([*r, *g, *b, *a])),
        _ => Err(PickerError::config(format!(
            "Not a valid color mapping: {:?} needs 3 or 4 components",
            value
        ))),
    }
}

/// Parse a comma separated drawing order, e.g. `"truck, logs, claw"`.
pub fn parse_label_order(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Command-line interface.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "label-picker",
    version,
    about = "Pick the best label from a collection of labels."
)]
pub struct Cli {
    /// Label file(s) in JSON
    #[arg(short = 'f', long = "label-files", alias = "label_files", num_args = 1..)]
    pub label_files: Vec<PathBuf>,

    /// Directory to store images
    #[arg(short = 'i', long = "image-path", alias = "image_path")]
    pub image_path: Option<PathBuf>,

    /// Directory to store final labels
    #[arg(short = 'l', long = "label-path", alias = "label_path")]
    pub label_path: Option<PathBuf>,

    /// Mapping from label type to RGB color, e.g. "{'claw': '255, 0, 0', 'truck': '0, 255, 0'}"
    #[arg(short = 'c', long = "color-map", alias = "color_map")]
    pub color_map: Option<String>,

    /// Drawing order of labels, e.g. 'truck, logs, claw'
    #[arg(short = 'o', long = "label-order", alias = "label_order")]
    pub label_order: Option<String>,

    /// Height scale of labeled image previews
    #[arg(short = 's', long = "label-scale", alias = "label_scale")]
    pub label_scale: Option<u32>,

    /// Label base canvas directory, new labels are added on top of these canvas images
    #[arg(long = "canvas-path", alias = "canvas_path")]
    pub canvas_path: Option<PathBuf>,

    /// Automatically accept the preselection
    #[arg(long, overrides_with = "no_auto")]
    pub auto: bool,

    /// Wait for the reviewer on every item
    #[arg(long, overrides_with = "auto")]
    pub no_auto: bool,

    /// Start every item with nothing selected
    #[arg(long)]
    pub no_preselect: bool,

    /// JSON config file with the same settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait after the category coverage warning (0 skips)
    #[arg(long)]
    pub coverage_delay_secs: Option<u64>,

    /// Download attempts per image
    #[arg(long)]
    pub fetch_retries: Option<u32>,

    /// Pause between download attempts in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Per-attempt download timeout in seconds
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Verified images buffered ahead of the reviewer
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Directory to write candidate previews to
    #[arg(long)]
    pub preview_path: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

/// Settings file; every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Version of the configuration file format
    pub version: u32,
    pub label_files: Vec<PathBuf>,
    pub image_path: Option<PathBuf>,
    pub label_path: Option<PathBuf>,
    /// Category → `"R, G, B[, A]"`
    pub color_map: Option<IndexMap<String, String>>,
    pub label_order: Option<Vec<String>>,
    pub label_scale: Option<u32>,
    pub canvas_path: Option<PathBuf>,
    pub auto: Option<bool>,
    pub preselect: Option<bool>,
    pub coverage_delay_secs: Option<u64>,
    pub fetch_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub preview_path: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
}

impl ConfigFile {
    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PickerError::config(format!("Failed to parse configuration: {}", e)))?;

        if config.version > CONFIG_VERSION {
            return Err(PickerError::config(format!(
                "Configuration file version {} is newer than supported version {}",
                config.version, CONFIG_VERSION
            )));
        }
        Ok(config)
    }

    /// Read a config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PickerError::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

/// Fully resolved session settings.
#[derive(Debug, Clone)]
pub struct PickerConfig {
    pub label_files: Vec<PathBuf>,
    pub image_dir: PathBuf,
    pub label_dir: PathBuf,
    pub canvas_dir: Option<PathBuf>,
    pub colors: ColorMap,
    /// Categories to review, in drawing order (later drawn on top)
    pub label_order: Vec<String>,
    pub preview_height: u32,
    pub auto_commit: bool,
    pub preselect: bool,
    pub coverage_delay: Duration,
    pub fetch: FetchOptions,
    pub fetch_timeout: Duration,
    pub preview_dir: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl PickerConfig {
    /// Resolve flags, loading the config file they point to.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge flags over file settings and validate the result.
    pub fn resolve(cli: Cli, file: ConfigFile) -> Result<Self> {
        let label_files = if cli.label_files.is_empty() {
            file.label_files
        } else {
            cli.label_files
        };
        if label_files.is_empty() {
            return Err(PickerError::config("No label files given (-f)"));
        }

        let image_dir = cli
            .image_path
            .or(file.image_path)
            .ok_or_else(|| PickerError::config("No image directory given (-i)"))?;
        let label_dir = cli
            .label_path
            .or(file.label_path)
            .ok_or_else(|| PickerError::config("No label directory given (-l)"))?;

        let colors = match (cli.color_map, file.color_map) {
            (Some(spec), _) => ColorMap::parse(&spec)?,
            (None, Some(pairs)) => ColorMap::from_pairs(pairs)?,
            (None, None) => return Err(PickerError::config("No color map given (-c)")),
        };

        let label_order = match (cli.label_order, file.label_order) {
            (Some(spec), _) => parse_label_order(&spec),
            (None, Some(order)) => order,
            (None, None) => return Err(PickerError::config("No label order given (-o)")),
        };
        if let Some(missing) = label_order.iter().find(|name| !colors.contains(name)) {
            return Err(PickerError::config(format!(
                "Label {:?} has no color in the color map",
                missing
            )));
        }

        let auto_commit = if cli.auto {
            true
        } else if cli.no_auto {
            false
        } else {
            file.auto.unwrap_or(false)
        };
        let preselect = if cli.no_preselect {
            false
        } else {
            file.preselect.unwrap_or(true)
        };
        if auto_commit && !preselect {
            return Err(PickerError::config(
                "Auto mode commits the preselection and cannot be combined with --no-preselect",
            ));
        }

        let fetch = FetchOptions {
            max_attempts: cli
                .fetch_retries
                .or(file.fetch_retries)
                .unwrap_or(FetchOptions::DEFAULT_MAX_ATTEMPTS),
            retry_delay: cli
                .retry_delay_ms
                .or(file.retry_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(FetchOptions::DEFAULT_RETRY_DELAY),
            queue_capacity: cli
                .queue_capacity
                .or(file.queue_capacity)
                .unwrap_or(FetchOptions::DEFAULT_QUEUE_CAPACITY),
            poll_timeout: FetchOptions::DEFAULT_POLL_TIMEOUT,
        };

        Ok(Self {
            label_files,
            image_dir,
            label_dir,
            canvas_dir: cli.canvas_path.or(file.canvas_path),
            colors,
            label_order,
            preview_height: cli
                .label_scale
                .or(file.label_scale)
                .unwrap_or(DEFAULT_LABEL_SCALE),
            auto_commit,
            preselect,
            coverage_delay: cli
                .coverage_delay_secs
                .or(file.coverage_delay_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COVERAGE_DELAY),
            fetch,
            fetch_timeout: cli
                .fetch_timeout_secs
                .or(file.fetch_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(UrlFetcher::DEFAULT_TIMEOUT),
            preview_dir: cli.preview_path.or(file.preview_path),
            log_level: cli.log_level.or(file.log_level).unwrap_or_default(),
        })
    }

    /// Disk layout described by this config.
    pub fn store(&self) -> LabelStore {
        LabelStore::new(&self.image_dir, &self.label_dir).with_canvas_dir(self.canvas_dir.clone())
    }
}
