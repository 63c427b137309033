use crate::error::{BoxError, ReactiveError};
use crate::observe::Value;
use crate::watch::watcher::{Watcher, WatcherOptions};

/// A lazily evaluated, memoized reactive computation.
///
/// The thunk is not invoked when a dependency changes; the computation only
/// marks itself stale and recomputes on the next [`Computed::get`]. Reading
/// it from inside another evaluation chains the dependencies through, so a
/// watcher that reads a `Computed` re-runs when the computed's own inputs
/// change.
///
/// # Examples
///
/// ```
/// use ripple::{Computed, ObservedMap, Runtime, Value};
///
/// Runtime::scope(|| {
///     let state = ObservedMap::new();
///     state.set("n", 4);
///
///     let reader = state.clone();
///     let doubled = Computed::new(move || {
///         let n = reader.get("n").as_int().unwrap_or(0);
///         Ok(Value::Int(n * 2))
///     });
///
///     assert_eq!(doubled.get().unwrap(), Value::Int(8));
///     state.set("n", 5);
///     assert_eq!(doubled.get().unwrap(), Value::Int(10));
/// });
/// ```
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value, BoxError> + 'static,
    {
        let watcher = Watcher::new(
            getter,
            |_, _| Ok(()),
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        );
        Computed { watcher }
    }

    /// Current value, recomputing only if a dependency invalidated it since
    /// the last read. A failed recomputation leaves the computation stale,
    /// so the next read retries; the error propagates to this caller.
    pub fn get(&self) -> Result<Value, ReactiveError> {
        let inner = self.watcher.inner();
        if inner.is_dirty() {
            inner.evaluate()?;
        }
        // chain our dependencies onto whoever is evaluating right now
        inner.depend();
        Ok(inner.value())
    }

    pub fn id(&self) -> usize {
        self.watcher.id()
    }

    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::ObservedMap;
    use crate::runtime::Runtime;
    use crate::watch::watcher::{Watcher, WatcherOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn recomputes_only_when_read_after_invalidation() {
        Runtime::scope(|| {
            let state = ObservedMap::new();
            state.set("n", 1);

            let runs = Rc::new(Cell::new(0));
            let count = Rc::clone(&runs);
            let reader = state.clone();
            let memo = Computed::new(move || {
                count.set(count.get() + 1);
                Ok(reader.get("n"))
            });

            // lazy: no evaluation until the first read
            assert_eq!(runs.get(), 0);
            assert_eq!(memo.get().unwrap(), crate::observe::Value::Int(1));
            memo.get().unwrap();
            assert_eq!(runs.get(), 1);

            // invalidation alone does not recompute
            state.set("n", 2);
            assert_eq!(runs.get(), 1);

            assert_eq!(memo.get().unwrap(), crate::observe::Value::Int(2));
            memo.get().unwrap();
            assert_eq!(runs.get(), 2);
        });
    }

    #[test]
    fn chains_through_an_outer_watcher() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("n", 1);

            let reader = state.clone();
            let memo = Rc::new(Computed::new(move || Ok(reader.get("n"))));

            let hits = Rc::new(Cell::new(0));
            let fired = Rc::clone(&hits);
            let inner = Rc::clone(&memo);
            let _watcher = Watcher::new(
                move || inner.get().map_err(Into::into),
                move |_, _| {
                    fired.set(fired.get() + 1);
                    Ok(())
                },
                WatcherOptions::default(),
            );

            state.set("n", 2);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);
        });
    }
}
