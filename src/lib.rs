//! label-picker
//!
//! Review tool for crowd-sourced polygon annotations. Several annotators'
//! label files are merged, source images are fetched in the background, and
//! for every image a reviewer picks the best candidate polygon per category.
//! The chosen polygons are rasterized into one color-coded PNG per image.

pub mod config;
pub mod console;
pub mod error;
pub mod fetch;
pub mod record;
pub mod session;
pub mod store;

#[cfg(test)]
mod tests;

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

pub use config::PickerConfig;
pub use error::{PickerError, Result};
pub use session::{FinishReason, ReviewSession, SessionState};

use console::ConsoleShell;
use fetch::{FetchJob, FetchQueue, Fetcher, UrlFetcher};
use record::LabelRecord;
use session::LogShell;

/// Run a full review session with the network fetcher, reading commands
/// from stdin unless in auto mode.
///
/// Returns `None` when the reviewer quit before the session finished.
pub fn run(config: &PickerConfig) -> Result<Option<FinishReason>> {
    let fetcher = Arc::new(UrlFetcher::new(config.fetch_timeout)?);
    run_with_fetcher(config, fetcher, io::stdin().lock())
}

/// [`run`] with an explicit fetcher and command source.
pub fn run_with_fetcher(
    config: &PickerConfig,
    fetcher: Arc<dyn Fetcher>,
    input: impl BufRead,
) -> Result<Option<FinishReason>> {
    let store = config.store();
    store.ensure_dirs()?;

    let record = record::merge(&config.label_files)?;
    if record.is_empty() {
        log::warn!("The label files contain no items");
    }
    warn_uncovered_categories(&record, config);

    let jobs = FetchJob::from_record(&record);
    let queue = FetchQueue::spawn(jobs, store.clone(), fetcher, &config.fetch)?;
    let options = config.review_options();

    let state = if config.auto_commit {
        let mut session = ReviewSession::new(record, store, queue, options, LogShell);
        session.advance()?;
        session.state().clone()
    } else {
        let shell = ConsoleShell::new(
            io::stdout(),
            config.preview_dir.clone(),
            config.preview_height,
        );
        let mut session = ReviewSession::new(record, store, queue, options, shell);
        session.advance()?;
        console::run(&mut session, input)?;
        session.state().clone()
    };

    Ok(match state {
        SessionState::Finished(reason) => Some(reason),
        _ => None,
    })
}

/// Warn about categories present in the labels that will never be drawn,
/// then give the operator time to abort.
fn warn_uncovered_categories(record: &LabelRecord, config: &PickerConfig) {
    let missing = record.categories_missing_from(&config.label_order);
    if missing.is_empty() {
        return;
    }
    log::warn!(
        "Label order {:?} does not cover {:?}; those categories will be ignored",
        config.label_order,
        missing
    );
    if !config.coverage_delay.is_zero() {
        log::warn!(
            "Continuing in {} s, press Ctrl+C to abort",
            config.coverage_delay.as_secs()
        );
        thread::sleep(config.coverage_delay);
    }
}
