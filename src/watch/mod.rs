//! Subscribers and the update scheduler.
//!
//! This module provides the consuming side of the reactive graph:
//! - [`Watcher`]: one unit of reactive computation
//! - [`Computed`]: lazy, memoized computations
//! - [`watch`]: user-level watch registration
//! - the dedup, order-preserving flush queue

mod computed;
pub(crate) mod scheduler;
pub(crate) mod watcher;

pub use computed::Computed;
pub use scheduler::{post_flush, MAX_UPDATE_COUNT};
pub use watcher::{HookFn, Watcher, WatcherOptions};

use std::rc::Rc;

use crate::error::{BoxError, ReactiveError};
use crate::observe::Value;
use crate::runtime::Runtime;

/// Options for [`watch`].
#[derive(Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire on mutations anywhere inside the watched value, not just when
    /// the top-level expression changes.
    pub deep: bool,
    /// Invoke the callback once immediately with the current value.
    pub immediate: bool,
    /// Skip the scheduler and fire synchronously on notification.
    pub sync: bool,
}

/// Register a user watcher over an arbitrary thunk.
///
/// User watchers are error-isolated: failures in the thunk or the callback
/// go to the runtime's shared error handler instead of propagating, and the
/// watcher keeps its last-good value. The returned [`Watcher`] unsubscribes
/// on drop.
///
/// # Examples
///
/// ```
/// use ripple::{watch, ObservedMap, Runtime, Value, WatchOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// Runtime::scope(|| {
///     let state = ObservedMap::new();
///     state.set("count", 1);
///
///     let seen = Rc::new(RefCell::new(Vec::new()));
///     let log = Rc::clone(&seen);
///     let reader = state.clone();
///     let _guard = watch(
///         move || Ok(reader.get("count")),
///         move |new, old| {
///             log.borrow_mut().push((new.clone(), old.clone()));
///             Ok(())
///         },
///         WatchOptions::default(),
///     );
///
///     state.set("count", 2);
///     Runtime::current().run_ticks();
///     assert_eq!(seen.borrow()[0], (Value::Int(2), Value::Int(1)));
/// });
/// ```
pub fn watch<G, C>(getter: G, cb: C, options: WatchOptions) -> Watcher
where
    G: Fn() -> Result<Value, BoxError> + 'static,
    C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
{
    let cb = Rc::new(cb);
    let watcher = Watcher::new(
        getter,
        {
            let cb = Rc::clone(&cb);
            move |new: &Value, old: &Value| cb(new, old)
        },
        WatcherOptions {
            deep: options.deep,
            sync: options.sync,
            user: true,
            ..Default::default()
        },
    );
    if options.immediate {
        let value = watcher.value();
        if let Err(source) = cb(&value, &Value::Null) {
            let err = ReactiveError::Callback {
                watcher: watcher.id(),
                source,
            };
            Runtime::current().handle_error(&err);
        }
    }
    watcher
}
