//! The review state machine.
//!
//! ```text
//! Idle ──next key──▶ Loading ──▶ AwaitingSelection ──commit──▶ Persisting ──▶ Idle
//!   │                                  ▲                                       │
//!   └──stream ended──▶ Finished ──undo─┘ (re-opens with the requeued key)      │
//!                        ▲─────────────────────────────────────────────────────┘
//! ```
//!
//! Keys come from the [`FetchQueue`] in record order. Keys whose output label
//! already exists are skipped, which is what makes a restarted session pick
//! up where the last one stopped.

pub mod item;
pub mod shell;

use std::fmt;
use std::path::PathBuf;

pub use item::{CandidateGeometry, CategoryCandidates, ReviewItem, Selection, candidate_geometries};
pub use shell::{LogShell, ReviewShell};

use crate::config::{ColorMap, PickerConfig};
use crate::error::{PickerError, Result};
use crate::fetch::FetchQueue;
use crate::record::{ItemKey, LabelRecord};
use crate::store::LabelStore;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading(ItemKey),
    AwaitingSelection(ItemKey),
    Persisting(ItemKey),
    Finished(FinishReason),
}

/// Why the session finished.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    /// Every key was delivered and reviewed
    Completed,
    /// The fetch worker gave up; the message names the URL
    FetchFailed(String),
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Completed => write!(f, "completed"),
            FinishReason::FetchFailed(message) => write!(f, "fetch failed: {}", message),
        }
    }
}

/// Result of [`ReviewSession::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The label was written here and the session moved on
    Committed(PathBuf),
    /// Some categories have no selection yet; nothing happened
    Incomplete,
    /// No item is awaiting selection; nothing happened
    NotReady,
}

/// Review settings the session needs.
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Categories to review, in drawing order
    pub label_order: Vec<String>,
    pub colors: ColorMap,
    /// Commit every item as soon as it is loaded
    pub auto_commit: bool,
    /// Start each category at candidate 0 instead of unselected
    pub preselect: bool,
}

impl PickerConfig {
    pub fn review_options(&self) -> ReviewOptions {
        ReviewOptions {
            label_order: self.label_order.clone(),
            colors: self.colors.clone(),
            auto_commit: self.auto_commit,
            preselect: self.preselect,
        }
    }
}

/// Drives items from the fetch queue through review to the label store.
pub struct ReviewSession<S: ReviewShell> {
    record: LabelRecord,
    store: LabelStore,
    queue: FetchQueue,
    options: ReviewOptions,
    shell: S,
    state: SessionState,
    item: Option<ReviewItem>,
    /// Last committed key, the target of undo
    previous_key: Option<ItemKey>,
}

impl<S: ReviewShell> ReviewSession<S> {
    pub fn new(
        record: LabelRecord,
        store: LabelStore,
        queue: FetchQueue,
        options: ReviewOptions,
        shell: S,
    ) -> Self {
        Self {
            record,
            store,
            queue,
            options,
            shell,
            state: SessionState::Idle,
            item: None,
            previous_key: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Finished(_))
    }

    /// The item awaiting selection, if any.
    pub fn current_item(&self) -> Option<&ReviewItem> {
        self.item.as_ref()
    }

    pub fn previous_key(&self) -> Option<&str> {
        self.previous_key.as_deref()
    }

    pub fn record(&self) -> &LabelRecord {
        &self.record
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    pub fn options(&self) -> &ReviewOptions {
        &self.options
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    pub fn into_shell(self) -> S {
        self.shell
    }

    /// Move to the next unlabeled item, or to `Finished`.
    ///
    /// In auto mode every item is committed as it loads and this only returns
    /// once the session has finished.
    pub fn advance(&mut self) -> Result<()> {
        loop {
            self.item = None;
            self.state = SessionState::Idle;

            let Some(key) = self.next_unlabeled_key() else {
                self.finish();
                return Ok(());
            };
            self.load(key)?;

            if !self.options.auto_commit {
                return Ok(());
            }
            if self.persist_current()?.is_none() {
                // Nothing to preselect from; leave it to the reviewer.
                return Ok(());
            }
        }
    }

    /// Pick candidate `index` for `category` on the current item.
    pub fn select(&mut self, category: &str, index: usize) -> Result<()> {
        let item = awaiting_item(&self.state, &mut self.item)?;
        item.select(category, index)?;
        log::debug!("{}: {} -> {}", item.key(), category, index);
        self.shell.on_selection_changed(item);
        Ok(())
    }

    /// Remove the choice for `category` on the current item.
    pub fn clear(&mut self, category: &str) -> Result<bool> {
        let item = awaiting_item(&self.state, &mut self.item)?;
        if item.category(category).is_none() {
            return Err(PickerError::invalid_selection(format!(
                "{} has no category {:?}",
                item.key(),
                category
            )));
        }
        let cleared = item.clear(category);
        if cleared {
            self.shell.on_selection_changed(item);
        }
        Ok(cleared)
    }

    /// Write the label of the current item and move on.
    ///
    /// Does nothing unless every reviewed category has a selection.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        if !matches!(self.state, SessionState::AwaitingSelection(_)) {
            return Ok(CommitOutcome::NotReady);
        }
        match self.persist_current()? {
            Some(path) => {
                self.advance()?;
                Ok(CommitOutcome::Committed(path))
            }
            None => Ok(CommitOutcome::Incomplete),
        }
    }

    /// Delete the last committed label and review that item again next.
    ///
    /// Only one level deep. Returns the re-queued key.
    pub fn undo(&mut self) -> Result<Option<ItemKey>> {
        let Some(key) = self.previous_key.take() else {
            log::info!("Nothing to undo");
            return Ok(None);
        };
        if !self.store.remove(&key)? {
            log::warn!("Label for {} was already gone", key);
        }
        self.queue.requeue_front(key.clone());

        if self.is_finished() {
            self.advance()?;
        }
        Ok(Some(key))
    }

    fn next_unlabeled_key(&mut self) -> Option<ItemKey> {
        while let Some(key) = self.queue.next_key() {
            if self.store.exists(&key) {
                log::info!("{} already labeled, skipping", key);
                continue;
            }
            return Some(key);
        }
        None
    }

    fn load(&mut self, key: ItemKey) -> Result<()> {
        self.state = SessionState::Loading(key.clone());
        let record = self
            .record
            .get(&key)
            .ok_or_else(|| PickerError::UnknownItem { key: key.clone() })?;
        let source = self.store.load_source_image(&key)?;
        let canvas = self.store.load_canvas(&key)?;
        let item = ReviewItem::build(key.clone(), record, source, canvas, &self.options)?;

        log::info!("Processing {}", self.store.source_path(&key).display());
        self.state = SessionState::AwaitingSelection(key);
        self.shell.on_item_ready(&item);
        self.item = Some(item);
        Ok(())
    }

    /// Save the current item if resolved. `None` leaves everything as it was.
    fn persist_current(&mut self) -> Result<Option<PathBuf>> {
        let Some(item) = self.item.as_ref() else {
            return Ok(None);
        };
        let Some(label) = item.composite() else {
            log::info!(
                "{} still needs a selection for: {}",
                item.key(),
                item.unresolved().join(", ")
            );
            return Ok(None);
        };

        let key = item.key().to_string();
        self.state = SessionState::Persisting(key.clone());
        let path = match self.store.save(&key, &label) {
            Ok(path) => path,
            Err(e) => {
                self.state = SessionState::AwaitingSelection(key);
                return Err(e);
            }
        };

        self.shell.on_committed(&key, &path);
        self.previous_key = Some(key);
        self.item = None;
        self.state = SessionState::Idle;
        Ok(Some(path))
    }

    fn finish(&mut self) {
        let reason = match self.queue.failure() {
            Some(e) => FinishReason::FetchFailed(e.to_string()),
            None => FinishReason::Completed,
        };
        log::info!("Finished: {}", reason);
        self.shell.on_finished(&reason);
        self.state = SessionState::Finished(reason);
    }
}

fn awaiting_item<'a>(
    state: &SessionState,
    item: &'a mut Option<ReviewItem>,
) -> Result<&'a mut ReviewItem> {
    match (state, item.as_mut()) {
        (SessionState::AwaitingSelection(_), Some(item)) => Ok(item),
        _ => Err(PickerError::invalid_selection("No item is awaiting selection")),
    }
}
