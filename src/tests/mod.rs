//! End-to-end tests of the review pipeline.
//!
//! These run the real fetch worker and label store against temporary
//! directories. Fetchers are stubbed where the test needs to count or fail
//! downloads.


use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::config::ColorMap;
use crate::fetch::{FetchError, FetchJob, FetchOptions, FetchQueue, Fetcher};
use crate::record::{ItemRecord, LabelRecord};
use crate::session::{FinishReason, ReviewItem, ReviewOptions, ReviewSession, ReviewShell};
use crate::store::LabelStore;

pub(super) const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub(super) const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Polygon JSON for the axis-aligned square `[x0, x1) x [y0, y1)`.
pub(super) fn square(x0: u32, y0: u32, x1: u32, y1: u32) -> String {
    format!(
        r#"{{"type": "Polygon", "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}]]]}}"#
    )
}

pub(super) fn item(url: &str, per_label: &str) -> ItemRecord {
    serde_json::from_str(&format!(
        r#"{{"image_url": "{}", "per_label": {{{}}}}}"#,
        url, per_label
    ))
    .expect("item should parse")
}

pub(super) fn colors() -> ColorMap {
    let mut colors = ColorMap::default();
    colors.insert("logo", RED);
    colors.insert("badge", GREEN);
    colors
}

pub(super) fn review_options(preselect: bool, auto_commit: bool) -> ReviewOptions {
    ReviewOptions {
        label_order: vec!["logo".to_string(), "badge".to_string()],
        colors: colors(),
        auto_commit,
        preselect,
    }
}

pub(super) fn fast_fetch() -> FetchOptions {
    FetchOptions {
        max_attempts: 10,
        retry_delay: Duration::ZERO,
        queue_capacity: 2,
        poll_timeout: Duration::from_millis(20),
    }
}

/// Writes a small gray PNG for every URL and remembers what it was asked for.
#[derive(Default)]
pub(super) struct PngFetcher {
    pub(super) urls: Mutex<Vec<String>>,
}

impl PngFetcher {
    pub(super) fn fetched(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Fetcher for PngFetcher {
    fn fetch(&self, url: &str, dst: &Path) -> Result<(), FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        RgbaImage::from_pixel(8, 8, Rgba([128, 128, 128, 255]))
            .save_with_format(dst, ImageFormat::Png)
            .map_err(|e| FetchError::Worker(e.to_string()))
    }
}

/// Fails every attempt.
#[derive(Default)]
pub(super) struct DeadFetcher {
    pub(super) attempts: Mutex<u32>,
}

impl Fetcher for DeadFetcher {
    fn fetch(&self, url: &str, _dst: &Path) -> Result<(), FetchError> {
        *self.attempts.lock().unwrap() += 1;
        Err(FetchError::Status {
            url: url.to_string(),
            status: 503,
        })
    }
}

/// Shell that records what the session told it.
#[derive(Debug, Default)]
pub(super) struct RecordingShell {
    pub(super) ready: Vec<String>,
    pub(super) committed: Vec<(String, PathBuf)>,
    pub(super) selection_changes: usize,
    pub(super) finished: Option<FinishReason>,
    pub(super) help_requests: usize,
}

impl ReviewShell for RecordingShell {
    fn on_item_ready(&mut self, item: &ReviewItem) {
        self.ready.push(item.key().to_string());
    }

    fn on_selection_changed(&mut self, _item: &ReviewItem) {
        self.selection_changes += 1;
    }

    fn on_committed(&mut self, key: &str, path: &Path) {
        self.committed.push((key.to_string(), path.to_path_buf()));
    }

    fn on_finished(&mut self, reason: &FinishReason) {
        self.finished = Some(reason.clone());
    }

    fn on_help(&mut self, _commands: &str) {
        self.help_requests += 1;
    }
}

/// Command source that fails the test if anything reads from it.
pub(super) struct UnreadableInput;

impl std::io::Read for UnreadableInput {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        panic!("input must not be read");
    }
}

impl std::io::BufRead for UnreadableInput {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        panic!("input must not be read");
    }

    fn consume(&mut self, _amt: usize) {}
}

pub(super) fn store(dir: &tempfile::TempDir) -> LabelStore {
    let store = LabelStore::new(dir.path().join("images"), dir.path().join("labels"));
    store.ensure_dirs().unwrap();
    store
}

/// Two items, each with two logo candidates and one badge candidate.
pub(super) fn two_item_record() -> LabelRecord {
    let per_label = format!(
        r#""logo": {{"user_polygons": [{}, {}]}}, "badge": {{"user_polygons": [{}]}}"#,
        square(0, 0, 4, 4),
        square(4, 4, 8, 8),
        square(4, 0, 8, 4),
    );
    let mut record = LabelRecord::new();
    record.merge_item("a.png".to_string(), item("http://host/a.png", &per_label));
    record.merge_item("b.png".to_string(), item("http://host/b.png", &per_label));
    record
}

pub(super) fn session_with(
    record: LabelRecord,
    store: LabelStore,
    fetcher: Arc<dyn Fetcher>,
    options: ReviewOptions,
) -> ReviewSession<RecordingShell> {
    let jobs = FetchJob::from_record(&record);
    let queue = FetchQueue::spawn(jobs, store.clone(), fetcher, &fast_fetch()).unwrap();
    ReviewSession::new(record, store, queue, options, RecordingShell::default())
}

pub(super) fn write_json(path: &Path, json: &str) {
    fs::write(path, json).unwrap();
}
