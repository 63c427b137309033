//! # ripple
//!
//! A fine-grained reactive state engine for single-threaded Rust.
//!
//! ripple tracks which computations read which pieces of state and re-runs
//! exactly those computations when the state they touched changes. Reads
//! inside a watcher's thunk are recorded automatically; writes notify the
//! recorded subscribers through a batching scheduler, so several writes in
//! a row cost one re-run per affected watcher.
//!
//! ## Building blocks
//!
//! - [`ObservedMap`] and [`ObservedList`]: observable containers holding
//!   dynamic [`Value`]s
//! - [`watch`] / [`Watcher`]: re-run a thunk when its inputs change and
//!   report old and new values to a callback
//! - [`Computed`]: lazy, memoized derived values
//! - [`Runtime`]: the per-thread engine owning the tracking stack, the
//!   flush queue, and the tick pump
//!
//! ## Example
//!
//! ```
//! use ripple::{watch, ObservedMap, Runtime, Value, WatchOptions};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! Runtime::scope(|| {
//!     let state = ObservedMap::new();
//!     state.set("count", 0);
//!
//!     let fired = Rc::new(Cell::new(0));
//!     let hits = Rc::clone(&fired);
//!     let reader = state.clone();
//!     let _guard = watch(
//!         move || Ok(reader.get("count")),
//!         move |_, _| {
//!             hits.set(hits.get() + 1);
//!             Ok(())
//!         },
//!         WatchOptions::default(),
//!     );
//!
//!     state.set("count", 1);
//!     state.set("count", 2);
//!     Runtime::current().run_ticks();
//!
//!     // Two writes, one batched re-run.
//!     assert_eq!(fired.get(), 1);
//!     assert_eq!(state.get("count"), Value::Int(2));
//! });
//! ```

pub mod error;
pub mod observe;
pub mod runtime;
pub mod watch;

pub use error::{BoxError, ReactiveError};
pub use observe::{observe, Dep, ObservedList, ObservedMap, Value};
pub use runtime::Runtime;
pub use watch::{
    post_flush, watch, Computed, WatchOptions, Watcher, WatcherOptions, MAX_UPDATE_COUNT,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn smoke() {
        Runtime::scope(|| {
            let state = ObservedMap::new();
            state.set("greeting", "hello");

            let seen = Rc::new(RefCell::new(Vec::new()));
            let log = Rc::clone(&seen);
            let reader = state.clone();
            let _guard = watch(
                move || Ok(reader.get("greeting")),
                move |new, _| {
                    log.borrow_mut().push(new.clone());
                    Ok(())
                },
                WatchOptions::default(),
            );

            state.set("greeting", "world");
            Runtime::current().run_ticks();

            assert_eq!(*seen.borrow(), vec![Value::from("world")]);
        });
    }
}
