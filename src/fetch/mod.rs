//! Background image fetching.
//!
//! One worker thread walks the merged record in insertion order, makes sure
//! each source image is present and decodable in the image cache, and pushes
//! the item key onto a small bounded channel. Keys come out in the same order
//! they went in, which resume-on-restart relies on.
//!
//! Keys that already have an output label are emitted without fetching; the
//! review session is responsible for skipping them.
//!
//! The consumer pulls with a short timeout. A timeout while the worker is
//! alive just means "not yet"; a timeout (or disconnect) after the worker has
//! stopped is end-of-stream.

mod fetcher;

pub use fetcher::{Fetcher, UrlFetcher};

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::record::{ItemKey, LabelRecord};
use crate::store::{LabelStore, decode_image};

/// Errors raised while fetching source images.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network or protocol failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local file error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The URL scheme is neither http(s) nor file
    #[error("Unsupported URL: {url}")]
    UnsupportedUrl {
        /// Rejected URL
        url: String,
    },

    /// The cached or downloaded file does not decode as an image
    #[error("Not a readable image: {path:?}: {message}")]
    Undecodable {
        /// File that failed to decode
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Every attempt for one key failed
    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// URL that could not be fetched
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: String,
    },

    /// The worker thread could not be started or died unexpectedly
    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

/// One image the worker has to make available locally.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchJob {
    pub key: ItemKey,
    pub url: String,
}

impl FetchJob {
    /// Jobs for every item of `record`, in merge order.
    pub fn from_record(record: &LabelRecord) -> Vec<FetchJob> {
        record
            .iter()
            .map(|(key, item)| FetchJob {
                key: key.clone(),
                url: item.image_url.clone(),
            })
            .collect()
    }
}

/// Tuning of the fetch worker and its queue.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Attempts per key before the worker gives up
    pub max_attempts: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
    /// Verified keys buffered ahead of the reviewer
    pub queue_capacity: usize,
    /// How long a single pull waits before re-checking worker liveness
    pub poll_timeout: Duration,
}

impl FetchOptions {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            poll_timeout: Self::DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Outcome of one timed pull.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// A verified key
    Ready(ItemKey),
    /// Nothing yet, the worker is still running
    Pending,
    /// The worker has stopped and everything it sent was consumed
    Exhausted,
}

/// Consumer side of the fetch worker.
pub struct FetchQueue {
    receiver: Receiver<ItemKey>,
    /// Keys handed back by undo, delivered before anything from the worker
    requeued: VecDeque<ItemKey>,
    worker: Option<JoinHandle<Result<usize, FetchError>>>,
    failure: Option<FetchError>,
    poll_timeout: Duration,
}

impl FetchQueue {
    /// Start the worker thread over `jobs`.
    pub fn spawn(
        jobs: Vec<FetchJob>,
        store: LabelStore,
        fetcher: Arc<dyn Fetcher>,
        options: &FetchOptions,
    ) -> Result<Self, FetchError> {
        let (sender, receiver) = mpsc::sync_channel(options.queue_capacity.max(1));
        let worker_options = options.clone();

        let worker = thread::Builder::new()
            .name("image-fetch".to_string())
            .spawn(move || {
                log::debug!("Fetch worker started with {} job(s)", jobs.len());
                let result = run_worker(jobs, &store, fetcher.as_ref(), &worker_options, &sender);
                match &result {
                    Ok(sent) => log::debug!("Fetch worker finished after {} key(s)", sent),
                    Err(e) => log::error!("Fetch worker stopped: {}", e),
                }
                result
            })
            .map_err(|e| FetchError::Worker(format!("failed to spawn fetch thread: {}", e)))?;

        Ok(Self {
            receiver,
            requeued: VecDeque::new(),
            worker: Some(worker),
            failure: None,
            poll_timeout: options.poll_timeout,
        })
    }

    /// Whether the worker thread is still running.
    pub fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Wait up to the poll timeout for the next key.
    pub fn pull(&mut self) -> Pull {
        if let Some(key) = self.requeued.pop_front() {
            return Pull::Ready(key);
        }

        match self.receiver.recv_timeout(self.poll_timeout) {
            Ok(key) => Pull::Ready(key),
            Err(RecvTimeoutError::Timeout) if self.worker_alive() => Pull::Pending,
            Err(RecvTimeoutError::Timeout) => match self.receiver.try_recv() {
                // The worker may have sent a last key right before stopping.
                Ok(key) => Pull::Ready(key),
                Err(_) => {
                    self.reap();
                    Pull::Exhausted
                }
            },
            Err(RecvTimeoutError::Disconnected) => {
                self.reap();
                Pull::Exhausted
            }
        }
    }

    /// Block until the next key arrives or the stream ends.
    pub fn next_key(&mut self) -> Option<ItemKey> {
        loop {
            match self.pull() {
                Pull::Ready(key) => return Some(key),
                Pull::Pending => log::trace!("Waiting for the fetch worker"),
                Pull::Exhausted => return None,
            }
        }
    }

    /// Deliver `key` before anything else.
    pub fn requeue_front(&mut self, key: ItemKey) {
        log::debug!("Re-queued {}", key);
        self.requeued.push_front(key);
    }

    /// The error that stopped the worker, once the stream has ended.
    pub fn failure(&self) -> Option<&FetchError> {
        self.failure.as_ref()
    }

    fn reap(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        match handle.join() {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => self.failure = Some(e),
            Err(_) => self.failure = Some(FetchError::Worker("fetch thread panicked".to_string())),
        }
    }
}

/// Check that `path` decodes as an image of any supported format.
pub fn verify_image(path: &Path) -> Result<(), FetchError> {
    decode_image(path)
        .map(|_| ())
        .map_err(|e| FetchError::Undecodable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn run_worker(
    jobs: Vec<FetchJob>,
    store: &LabelStore,
    fetcher: &dyn Fetcher,
    options: &FetchOptions,
    sender: &SyncSender<ItemKey>,
) -> Result<usize, FetchError> {
    let total = jobs.len();
    let mut sent = 0;

    for (index, job) in jobs.into_iter().enumerate() {
        if store.exists(&job.key) {
            log::debug!("{} already labeled, emitting without fetch", job.key);
        } else {
            ensure_local(&job, store, fetcher, options, index, total)?;
        }

        if sender.send(job.key).is_err() {
            log::debug!("Key receiver dropped, fetch worker exiting");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

fn ensure_local(
    job: &FetchJob,
    store: &LabelStore,
    fetcher: &dyn Fetcher,
    options: &FetchOptions,
    index: usize,
    total: usize,
) -> Result<(), FetchError> {
    let dst = store.source_path(&job.key);
    if dst.is_file() {
        match verify_image(&dst) {
            Ok(()) => return Ok(()),
            Err(e) => log::warn!("Cached image unusable, downloading again: {}", e),
        }
    }

    log::info!("⬇️ Downloading image {} of {}", index + 1, total);
    let attempts = options.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match fetcher.fetch(&job.url, &dst).and_then(|()| verify_image(&dst)) {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt,
                    attempts,
                    job.url,
                    e
                );
                last_error = e.to_string();
                if attempt < attempts && !options.retry_delay.is_zero() {
                    thread::sleep(options.retry_delay);
                }
            }
        }
    }

    log::error!("Failed: {}", job.url);
    match fs::remove_file(&dst) {
        Ok(()) => log::debug!("Removed unusable download {}", dst.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Cannot remove {}: {}", dst.display(), e),
    }
    Err(FetchError::RetriesExhausted {
        url: job.url.clone(),
        attempts,
        last_error,
    })
}
