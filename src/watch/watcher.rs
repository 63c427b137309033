use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::error::{BoxError, ReactiveError};
use crate::observe::{traverse, Value};
use crate::runtime::Runtime;
use crate::watch::scheduler;

/// Hook invoked by the scheduler around a watcher's run.
pub type HookFn = dyn Fn();

/// Options controlling a watcher's evaluation semantics.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Recursively register every observable slot reachable from the
    /// evaluated value, not just the slots the thunk read directly.
    pub deep: bool,
    /// Do not self-schedule on notification; mark stale and recompute on
    /// the next explicit read.
    pub lazy: bool,
    /// Re-evaluate immediately on notification instead of going through the
    /// scheduler.
    pub sync: bool,
    /// User-registered: failures are routed to the shared error handler
    /// instead of propagating.
    pub user: bool,
    /// Runs right before the scheduler executes this watcher in a flush.
    pub before: Option<Rc<HookFn>>,
    /// Runs in the post-flush pass, after every watcher in the batch has
    /// settled, if this watcher is still active.
    pub updated: Option<Rc<HookFn>>,
}

/// A watcher evaluates a thunk, collects the dependencies the evaluation
/// read, and fires its callback when the evaluated value changes.
///
/// This one type covers all three subscriber kinds: eager side-effecting
/// (the default), lazy/memoized ([`WatcherOptions::lazy`], see
/// [`Computed`](crate::watch::Computed)), and user-registered
/// ([`WatcherOptions::user`], see [`watch`](crate::watch::watch)).
///
/// The handle is RAII: dropping it tears the watcher down, unsubscribing it
/// from every dependency.
///
/// # Examples
///
/// ```
/// use ripple::{ObservedMap, Runtime, Value, Watcher, WatcherOptions};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// Runtime::scope(|| {
///     let state = ObservedMap::new();
///     state.set("a", 1);
///
///     let fired = Rc::new(Cell::new(0));
///     let hits = Rc::clone(&fired);
///     let getter_state = state.clone();
///     let _watcher = Watcher::new(
///         move || Ok(getter_state.get("a")),
///         move |_new, _old| {
///             hits.set(hits.get() + 1);
///             Ok(())
///         },
///         WatcherOptions::default(),
///     );
///
///     state.set("a", 2);
///     Runtime::current().run_ticks();
///     assert_eq!(fired.get(), 1);
/// });
/// ```
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

pub(crate) struct WatcherInner {
    id: usize,
    runtime: Weak<Runtime>,
    getter: Box<dyn Fn() -> Result<Value, BoxError>>,
    cb: Box<dyn Fn(&Value, &Value) -> Result<(), BoxError>>,
    deep: bool,
    lazy: bool,
    sync: bool,
    user: bool,
    pub(crate) before: Option<Rc<HookFn>>,
    pub(crate) updated: Option<Rc<HookFn>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    // current deps and the ones discovered during the in-progress run;
    // the Vec keeps discovery order, the sets answer membership
    deps: RefCell<Vec<usize>>,
    new_deps: RefCell<Vec<usize>>,
    dep_ids: RefCell<HashSet<usize>>,
    new_dep_ids: RefCell<HashSet<usize>>,
}

impl Watcher {
    /// Create a watcher over `getter`, firing `cb` with (new, old) when the
    /// evaluated value changes.
    ///
    /// Non-lazy watchers evaluate immediately to collect their initial
    /// dependencies; an initial evaluation failure goes to the shared error
    /// handler and leaves the cached value at `Null`.
    pub fn new<G, C>(getter: G, cb: C, options: WatcherOptions) -> Self
    where
        G: Fn() -> Result<Value, BoxError> + 'static,
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let runtime = Runtime::current();
        let id = runtime.next_id();
        let inner = Rc::new(WatcherInner {
            id,
            runtime: Rc::downgrade(&runtime),
            getter: Box::new(getter),
            cb: Box::new(cb),
            deep: options.deep,
            lazy: options.lazy,
            sync: options.sync,
            user: options.user,
            before: options.before,
            updated: options.updated,
            active: Cell::new(true),
            dirty: Cell::new(options.lazy),
            value: RefCell::new(Value::Null),
            deps: RefCell::new(Vec::new()),
            new_deps: RefCell::new(Vec::new()),
            dep_ids: RefCell::new(HashSet::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
        });
        runtime.register_watcher(Rc::clone(&inner));
        if !inner.lazy {
            match inner.get() {
                Ok(value) => {
                    inner.value.replace(value);
                }
                Err(err) => runtime.handle_error(&err),
            }
        }
        Watcher { inner }
    }

    /// Id used for the scheduler's total ordering.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The most recently evaluated value.
    pub fn value(&self) -> Value {
        self.inner.value()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Unsubscribe from every tracked dependency and unregister. Idempotent;
    /// also runs on drop.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub(crate) fn inner(&self) -> &Rc<WatcherInner> {
        &self.inner
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl WatcherInner {
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    fn runtime(&self) -> Option<Rc<Runtime>> {
        self.runtime.upgrade()
    }

    /// Evaluate the thunk and re-collect dependencies.
    ///
    /// The context is pushed for the duration of the thunk, and dependency
    /// reconciliation runs whether or not it succeeded.
    pub(crate) fn get(&self) -> Result<Value, ReactiveError> {
        let Some(runtime) = self.runtime() else {
            return Ok(self.value());
        };
        runtime.push_target(Some(self.id));
        let result = (self.getter)();
        if self.deep {
            // touch everything reachable so nested slots count as deps
            if let Ok(value) = &result {
                traverse(value);
            }
        }
        runtime.pop_target();
        self.cleanup_deps(&runtime);
        result.map_err(|source| ReactiveError::Evaluation {
            watcher: self.id,
            source,
        })
    }

    /// Record a dependency discovered during the current evaluation.
    /// Idempotent per run; only subscribes when the dep was not already
    /// tracked by the previous run.
    pub(crate) fn add_dep(&self, dep_id: usize) {
        if self.new_dep_ids.borrow().contains(&dep_id) {
            return;
        }
        self.new_dep_ids.borrow_mut().insert(dep_id);
        self.new_deps.borrow_mut().push(dep_id);
        if !self.dep_ids.borrow().contains(&dep_id) {
            if let Some(runtime) = self.runtime() {
                runtime.add_sub(dep_id, self.id);
            }
        }
    }

    /// Unsubscribe from deps the latest run no longer touched, then promote
    /// the newly discovered set to current.
    fn cleanup_deps(&self, runtime: &Rc<Runtime>) {
        {
            let deps = self.deps.borrow();
            let new_ids = self.new_dep_ids.borrow();
            for dep_id in deps.iter() {
                if !new_ids.contains(dep_id) {
                    runtime.remove_sub(*dep_id, self.id);
                }
            }
        }
        self.dep_ids.replace(self.new_dep_ids.take());
        self.deps.replace(self.new_deps.take());
    }

    /// Subscriber interface; called when a dependency changes.
    pub(crate) fn update(self: Rc<Self>) {
        if self.lazy {
            self.dirty.set(true);
        } else if self.sync {
            if let Err(err) = self.run() {
                if let Some(runtime) = self.runtime() {
                    runtime.handle_error(&err);
                }
            }
        } else if let Some(runtime) = self.runtime() {
            scheduler::queue_watcher(&runtime, self);
        }
    }

    /// Scheduler job interface.
    ///
    /// Skipped when torn down. Fires the callback when the value changed by
    /// identity, or is a container, or `deep` is set — containers may have
    /// mutated in place without changing identity. A failed evaluation
    /// keeps the last-good value.
    pub(crate) fn run(&self) -> Result<(), ReactiveError> {
        if !self.active.get() {
            return Ok(());
        }
        let value = match self.get() {
            Ok(value) => value,
            Err(err) if self.user => {
                if let Some(runtime) = self.runtime() {
                    runtime.handle_error(&err);
                }
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let changed = !value.same_as(&self.value.borrow()) || value.is_container() || self.deep;
        if changed {
            let old = self.value.replace(value.clone());
            if let Err(source) = (self.cb)(&value, &old) {
                let err = ReactiveError::Callback {
                    watcher: self.id,
                    source,
                };
                if self.user {
                    if let Some(runtime) = self.runtime() {
                        runtime.handle_error(&err);
                    }
                } else {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Force recomputation and clear the stale flag; the lazy read path.
    /// On failure the flag stays set so the next read retries.
    pub(crate) fn evaluate(&self) -> Result<(), ReactiveError> {
        let value = self.get()?;
        self.value.replace(value);
        self.dirty.set(false);
        Ok(())
    }

    /// Register every currently-tracked dependency on the outer evaluation
    /// context, letting a memoized value be read reactively from inside
    /// another evaluation.
    pub(crate) fn depend(&self) {
        let Some(runtime) = self.runtime() else {
            return;
        };
        let deps = self.deps.borrow().clone();
        for dep_id in deps {
            runtime.depend_on(dep_id);
        }
    }

    pub(crate) fn teardown(&self) {
        if !self.active.get() {
            return;
        }
        self.active.set(false);
        if let Some(runtime) = self.runtime() {
            for dep_id in self.deps.borrow().iter() {
                runtime.remove_sub(*dep_id, self.id);
            }
            runtime.unregister_watcher(self.id);
        }
        self.deps.borrow_mut().clear();
        self.dep_ids.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::ObservedMap;
    use std::cell::Cell;

    fn counting_watcher(state: &ObservedMap, key: &'static str) -> (Watcher, Rc<Cell<usize>>) {
        let hits = Rc::new(Cell::new(0));
        let fired = Rc::clone(&hits);
        let state = state.clone();
        let watcher = Watcher::new(
            move || Ok(state.get(key)),
            move |_, _| {
                fired.set(fired.get() + 1);
                Ok(())
            },
            WatcherOptions::default(),
        );
        (watcher, hits)
    }

    #[test]
    fn reads_track_and_writes_notify() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("a", 1);
            state.set("b", 1);
            let (_watcher, hits) = counting_watcher(&state, "a");

            state.set("a", 2);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);

            // never read by the thunk
            state.set("b", 2);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);
        });
    }

    #[test]
    fn unchanged_write_is_a_no_op() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("a", 1);
            let (_watcher, hits) = counting_watcher(&state, "a");

            state.set("a", 1);
            runtime.run_ticks();
            assert_eq!(hits.get(), 0);
        });
    }

    #[test]
    fn reading_a_slot_twice_subscribes_once() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("a", 1);
            let probe = state.clone();
            let _watcher = Watcher::new(
                move || {
                    probe.get("a");
                    Ok(probe.get("a"))
                },
                |_, _| Ok(()),
                WatcherOptions::default(),
            );

            let dep_id = {
                let tracked = state.clone();
                // read the slot once more to find its dep through a throwaway watcher
                let spy = Watcher::new(
                    move || Ok(tracked.get("a")),
                    |_, _| Ok(()),
                    WatcherOptions::default(),
                );
                let id = spy.inner().deps.borrow()[0];
                drop(spy);
                id
            };
            assert_eq!(runtime.sub_count(dep_id), 1);
        });
    }

    #[test]
    fn branch_pruning_unsubscribes_stale_deps() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("use_a", true);
            state.set("a", 1);
            state.set("b", 10);

            let hits = Rc::new(Cell::new(0));
            let fired = Rc::clone(&hits);
            let branching = state.clone();
            let _watcher = Watcher::new(
                move || {
                    if branching.get("use_a") == crate::observe::Value::Bool(true) {
                        Ok(branching.get("a"))
                    } else {
                        Ok(branching.get("b"))
                    }
                },
                move |_, _| {
                    fired.set(fired.get() + 1);
                    Ok(())
                },
                WatcherOptions::default(),
            );

            state.set("use_a", false);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);

            // now on the b branch: mutating a must not enqueue the watcher
            state.set("a", 2);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);

            state.set("b", 11);
            runtime.run_ticks();
            assert_eq!(hits.get(), 2);
        });
    }

    #[test]
    fn teardown_stops_notifications() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("a", 1);
            let (watcher, hits) = counting_watcher(&state, "a");

            watcher.teardown();
            watcher.teardown(); // idempotent
            state.set("a", 3);
            runtime.run_ticks();
            assert_eq!(hits.get(), 0);
        });
    }

    #[test]
    fn sync_watcher_runs_without_a_tick() {
        Runtime::scope(|| {
            let state = ObservedMap::new();
            state.set("a", 1);

            let hits = Rc::new(Cell::new(0));
            let fired = Rc::clone(&hits);
            let sync_state = state.clone();
            let _watcher = Watcher::new(
                move || Ok(sync_state.get("a")),
                move |_, _| {
                    fired.set(fired.get() + 1);
                    Ok(())
                },
                WatcherOptions {
                    sync: true,
                    ..Default::default()
                },
            );

            state.set("a", 2);
            assert_eq!(hits.get(), 1);
        });
    }

    #[test]
    fn deep_watcher_sees_nested_mutations() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            let nested = ObservedMap::new();
            nested.set("x", 1);
            state.set("nested", nested.clone());

            let hits = Rc::new(Cell::new(0));
            let fired = Rc::clone(&hits);
            let deep_state = state.clone();
            let _watcher = Watcher::new(
                move || Ok(deep_state.get("nested")),
                move |_, _| {
                    fired.set(fired.get() + 1);
                    Ok(())
                },
                WatcherOptions {
                    deep: true,
                    ..Default::default()
                },
            );

            nested.set("x", 2);
            runtime.run_ticks();
            assert_eq!(hits.get(), 1);
        });
    }

    #[test]
    fn failing_user_evaluation_keeps_last_good_value() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let state = ObservedMap::new();
            state.set("a", 1);
            state.set("fail", false);

            let reported = Rc::new(Cell::new(0));
            let seen = Rc::clone(&reported);
            runtime.set_error_handler(move |_| seen.set(seen.get() + 1));

            let flaky = state.clone();
            let watcher = Watcher::new(
                move || {
                    if flaky.get("fail") == crate::observe::Value::Bool(true) {
                        Err("boom".into())
                    } else {
                        Ok(flaky.get("a"))
                    }
                },
                |_, _| Ok(()),
                WatcherOptions {
                    user: true,
                    ..Default::default()
                },
            );
            assert_eq!(watcher.value(), crate::observe::Value::Int(1));

            state.set("fail", true);
            runtime.run_ticks();
            assert_eq!(reported.get(), 1);
            assert_eq!(watcher.value(), crate::observe::Value::Int(1));
        });
    }
}
