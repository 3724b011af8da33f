//! Folds streamed response fragments into the conversation log.
use crate::openai::Role;

use super::models::{Entry, Fragment, Log};

/// Applies one fragment to the log and returns the next log.
///
/// A fragment for an id already in the log extends that entry's
/// content in place. A fragment with an unseen id appends a new
/// assistant entry, even when its delta is empty, so the turn shows
/// up before any text arrives. Entries never move, so the order of
/// the log is the order in which ids were first seen.
pub fn accumulate(mut log: Log, fragment: &Fragment) -> Log {
    match log.get_mut(&fragment.id) {
        Some(entry) => {
            entry.role = Role::Assistant;
            entry.content.push_str(&fragment.delta);
        }
        None => {
            log.push(Entry::new(
                &fragment.id,
                &fragment.model,
                Role::Assistant,
                &fragment.delta,
            ));
        }
    }
    log
}

/// Folds a whole fragment sequence starting from `log`.
pub fn accumulate_all<'a, I>(log: Log, fragments: I) -> Log
where
    I: IntoIterator<Item = &'a Fragment>,
{
    fragments.into_iter().fold(log, accumulate)
}
