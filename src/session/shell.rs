//! Hooks the session calls into whatever presents items to the reviewer.

use std::path::Path;

use super::FinishReason;
use super::item::ReviewItem;

/// Presentation side of a [`ReviewSession`](super::ReviewSession).
///
/// The session drives every transition; shells only observe. A shell for
/// unattended runs can ignore everything but [`ReviewShell::on_finished`].
pub trait ReviewShell {
    /// A new item is awaiting selection.
    fn on_item_ready(&mut self, item: &ReviewItem);

    /// The reviewer changed the selection of the current item.
    fn on_selection_changed(&mut self, _item: &ReviewItem) {}

    /// The label of `key` was written to `path`.
    fn on_committed(&mut self, _key: &str, _path: &Path) {}

    /// No more items will arrive.
    fn on_finished(&mut self, reason: &FinishReason);

    /// The reviewer asked for the list of commands.
    fn on_help(&mut self, _commands: &str) {}
}

/// Shell that only logs. Used for auto mode.
#[derive(Debug, Default)]
pub struct LogShell;

impl ReviewShell for LogShell {
    fn on_item_ready(&mut self, item: &ReviewItem) {
        log::debug!("{} ready with {} categories", item.key(), item.categories().len());
    }

    fn on_finished(&mut self, reason: &FinishReason) {
        match reason {
            FinishReason::Completed => log::info!("✅ All items reviewed"),
            FinishReason::FetchFailed(message) => log::error!("Review stopped: {}", message),
        }
    }
}
