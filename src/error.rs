//! Error types surfaced by the reactive engine.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error carried out of user-supplied thunks and callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures the engine reports through the runtime's error handler.
///
/// User watcher failures are isolated: the watcher keeps its last good
/// value and other watchers keep flushing. [`CircularUpdate`] aborts the
/// flush that detected it.
///
/// [`CircularUpdate`]: ReactiveError::CircularUpdate
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A watcher's evaluation thunk returned an error.
    #[error("evaluation of watcher #{watcher} failed")]
    Evaluation {
        watcher: usize,
        #[source]
        source: BoxError,
    },

    /// A watcher's change callback returned an error.
    #[error("change callback of watcher #{watcher} failed")]
    Callback {
        watcher: usize,
        #[source]
        source: BoxError,
    },

    /// A watcher kept re-queueing itself during a single flush.
    #[error(
        "possible infinite update loop in watcher #{watcher} \
         (re-triggered more than 100 times in one flush)"
    )]
    CircularUpdate { watcher: usize },
}

impl ReactiveError {
    /// Id of the watcher the failure belongs to.
    pub fn watcher(&self) -> usize {
        match self {
            ReactiveError::Evaluation { watcher, .. }
            | ReactiveError::Callback { watcher, .. }
            | ReactiveError::CircularUpdate { watcher } => *watcher,
        }
    }
}
