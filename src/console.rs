//! Line-oriented review front end.
//!
//! Each item is announced on the output with its categories and candidate
//! counts. When a preview directory is configured, every candidate overlay
//! and the current selection are written there as PNGs so they can be opened
//! in any image viewer while the reviewer types commands.
//!
//! Commands, one per line:
//!
//! | input              | effect                                  |
//! |--------------------|-----------------------------------------|
//! | `<category> <n>`   | choose candidate `n` for `category`     |
//! | `clear <category>` | drop the choice for `category`          |
//! | empty line or `c`  | commit the current item                 |
//! | `u`                | undo the last commit                    |
//! | `h` or `?`         | print this table                        |
//! | `q`                | quit                                    |

use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PickerError, Result};
use crate::session::{
    CommitOutcome, FinishReason, ReviewItem, ReviewSession, ReviewShell, SessionState,
};

const HELP: &str = "\
  <category> <n>    choose candidate n for category
  clear <category>  drop the choice for category
  <enter> | c       commit
  u                 undo the last commit
  h | ?             help
  q                 quit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select { category: String, index: usize },
    Clear(String),
    Commit,
    Undo,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = PickerError;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next(), words.next()) {
            (None, _, _) | (Some("c"), None, _) => Command::Commit,
            (Some("u"), None, _) => Command::Undo,
            (Some("q"), None, _) => Command::Quit,
            (Some("h" | "?"), None, _) => Command::Help,
            (Some("clear"), Some(category), None) => Command::Clear(category.to_string()),
            (Some(category), Some(index), None) => {
                let index = index.parse().map_err(|_| {
                    PickerError::invalid_selection(format!("{:?} is not a candidate index", index))
                })?;
                Command::Select {
                    category: category.to_string(),
                    index,
                }
            }
            _ => {
                return Err(PickerError::invalid_selection(format!(
                    "Unrecognized command {:?} (h for help)",
                    line.trim()
                )));
            }
        };
        Ok(command)
    }
}

/// Shell that prints to `out` and writes preview images.
pub struct ConsoleShell<W: Write> {
    out: W,
    preview_dir: Option<PathBuf>,
    preview_height: u32,
}

impl<W: Write> ConsoleShell<W> {
    pub fn new(out: W, preview_dir: Option<PathBuf>, preview_height: u32) -> Self {
        Self {
            out,
            preview_dir,
            preview_height,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn say(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(args).and_then(|()| self.out.flush()) {
            log::warn!("Cannot write to console: {}", e);
        }
    }

    fn describe(&mut self, item: &ReviewItem) {
        for category in item.categories() {
            let chosen = match item.selection().get(&category.name) {
                Some(index) => index.to_string(),
                None => "-".to_string(),
            };
            self.say(format_args!(
                "  {:<12} {} candidate(s), selected {}\n",
                category.name,
                category.overlays.len(),
                chosen
            ));
        }
    }

    fn write_candidate_previews(&self, dir: &Path, item: &ReviewItem) -> Result<()> {
        fs::create_dir_all(dir)?;
        let stem = preview_stem(item.key());
        for category in item.categories() {
            for index in 0..category.overlays.len() {
                if let Some(preview) =
                    item.candidate_preview(&category.name, index, self.preview_height)
                {
                    preview.save(dir.join(format!("{}_{}_{}.png", stem, category.name, index)))?;
                }
            }
        }
        Ok(())
    }

    fn write_selection_preview(&self, dir: &Path, item: &ReviewItem) -> Result<()> {
        fs::create_dir_all(dir)?;
        let preview = item.selection_preview(self.preview_height);
        preview.save(dir.join(format!("{}_selection.png", preview_stem(item.key()))))?;
        Ok(())
    }

    fn refresh_previews(&self, item: &ReviewItem, with_candidates: bool) {
        let Some(dir) = &self.preview_dir else {
            return;
        };
        let result = if with_candidates {
            self.write_candidate_previews(dir, item)
                .and_then(|()| self.write_selection_preview(dir, item))
        } else {
            self.write_selection_preview(dir, item)
        };
        if let Err(e) = result {
            log::warn!("Cannot write previews for {}: {}", item.key(), e);
        }
    }
}

impl<W: Write> ReviewShell for ConsoleShell<W> {
    fn on_item_ready(&mut self, item: &ReviewItem) {
        self.say(format_args!("\n{}\n", item.key()));
        self.describe(item);
        self.refresh_previews(item, true);
    }

    fn on_selection_changed(&mut self, item: &ReviewItem) {
        self.describe(item);
        self.refresh_previews(item, false);
    }

    fn on_committed(&mut self, key: &str, path: &Path) {
        self.say(format_args!("Saved {} -> {}\n", key, path.display()));
    }

    fn on_finished(&mut self, reason: &FinishReason) {
        match reason {
            FinishReason::Completed => {
                self.say(format_args!("All items reviewed. u to undo, q to quit\n"))
            }
            FinishReason::FetchFailed(message) => {
                self.say(format_args!("Stopped, an image could not be fetched: {}\n", message))
            }
        }
    }

    fn on_help(&mut self, commands: &str) {
        self.say(format_args!("{}\n", commands));
    }
}

/// File stem used for the preview images of `key`.
fn preview_stem(key: &str) -> String {
    Path::new(key)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

/// Whether the fetch worker gave up, after which no item can arrive.
fn fetch_failed<S: ReviewShell>(session: &ReviewSession<S>) -> bool {
    matches!(
        session.state(),
        SessionState::Finished(FinishReason::FetchFailed(_))
    )
}

/// Feed commands from `input` to `session` until `q`, end of input, or a
/// fetch failure.
///
/// Bad selections are reported and reading continues; anything else
/// that fails ends the loop with the error. A completed session keeps
/// reading so the last commit can still be undone.
pub fn run<S: ReviewShell>(session: &mut ReviewSession<S>, input: impl BufRead) -> Result<()> {
    let mut lines = input.lines();
    loop {
        if fetch_failed(session) {
            return Ok(());
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };

        let result = match command {
            Command::Quit => break,
            Command::Help => {
                session.shell_mut().on_help(HELP);
                Ok(())
            }
            Command::Select { category, index } => session.select(&category, index),
            Command::Clear(category) => session.clear(&category).map(|_| ()),
            Command::Commit => match session.commit()? {
                CommitOutcome::Committed(_) => Ok(()),
                CommitOutcome::Incomplete => {
                    log::warn!("Select a candidate for every category before committing");
                    Ok(())
                }
                CommitOutcome::NotReady => {
                    log::info!("Nothing to commit");
                    Ok(())
                }
            },
            Command::Undo => session.undo().map(|_| ()),
        };

        match result {
            Ok(()) => {}
            Err(e @ PickerError::InvalidSelection { .. }) => log::warn!("{}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
