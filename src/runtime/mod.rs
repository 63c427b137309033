//! Runtime support for the reactive core.
//!
//! This module provides the evaluation-context stack, id allocation, the
//! dependency and watcher registries, and the tick queue that drives batched
//! flushes.

mod context;
pub(crate) mod tick;

pub use context::Runtime;
