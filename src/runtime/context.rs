use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::runtime::tick::{self, TickState};
use crate::watch::scheduler::SchedulerState;
use crate::watch::watcher::WatcherInner;

pub(crate) type WatcherId = usize;
pub(crate) type DepId = usize;

thread_local! {
    // Stack for scoped runtimes; the default runtime is the fallback.
    static RUNTIME_STACK: RefCell<Vec<Rc<Runtime>>> = const { RefCell::new(Vec::new()) };
    static DEFAULT_RUNTIME: Rc<Runtime> = Runtime::new();
}

/// Thread-confined reactive runtime.
///
/// The runtime owns everything the reactive graph shares: the
/// evaluation-context stack that lets property reads discover who is
/// listening, the dependency subscriber tables, the watcher registry, the
/// scheduler queue, and the tick queue. The model is strictly
/// single-threaded and cooperative, so all of it lives behind plain
/// `RefCell`s on one thread.
///
/// Most code never touches a runtime directly: containers and watchers bind
/// to [`Runtime::current`] when created.
///
/// # Examples
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use ripple::{ObservedMap, Runtime, Value};
///
/// Runtime::scope(|| {
///     let state = ObservedMap::new();
///     state.set("a", 1);
///     assert_eq!(state.get("a"), Value::Int(1));
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct Runtime {
    next_id: Cell<usize>,
    // The watcher currently evaluating, plus a stack for nested evaluation.
    // `None` frames disable tracking (used while error handlers run).
    target_stack: RefCell<Vec<Option<WatcherId>>>,
    // Dependency id -> subscribed watcher ids. Dedup is upheld by the
    // watchers' own id sets, as in `WatcherInner::add_dep`.
    dep_subs: RefCell<HashMap<DepId, Vec<WatcherId>>>,
    watchers: RefCell<HashMap<WatcherId, Rc<WatcherInner>>>,
    pub(crate) scheduler: RefCell<SchedulerState>,
    pub(crate) ticks: RefCell<TickState>,
    async_mode: Cell<bool>,
    error_handler: RefCell<Option<Rc<dyn Fn(&ReactiveError)>>>,
}

impl Runtime {
    fn new() -> Rc<Self> {
        Rc::new(Runtime {
            next_id: Cell::new(0),
            target_stack: RefCell::new(Vec::new()),
            dep_subs: RefCell::new(HashMap::new()),
            watchers: RefCell::new(HashMap::new()),
            scheduler: RefCell::new(SchedulerState::default()),
            ticks: RefCell::new(TickState::default()),
            async_mode: Cell::new(true),
            error_handler: RefCell::new(None),
        })
    }

    /// Get the current runtime (scoped, or the per-thread default).
    pub fn current() -> Rc<Self> {
        RUNTIME_STACK
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(|| DEFAULT_RUNTIME.with(Rc::clone))
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Useful for testing: watchers and containers created inside bind to
    /// the scoped runtime, and all of its state is dropped when the function
    /// returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(), f)
    }

    /// Run a function with a specific runtime as the current context.
    pub fn with_runtime<F, R>(runtime: Rc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| stack.borrow_mut().push(runtime));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Generate the next unique id for a reactive primitive.
    ///
    /// Watchers and dependencies share the counter; watcher ids double as
    /// the total order the scheduler flushes in.
    pub(crate) fn next_id(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    // --- evaluation context ---

    pub(crate) fn push_target(&self, target: Option<WatcherId>) {
        self.target_stack.borrow_mut().push(target);
    }

    pub(crate) fn pop_target(&self) {
        self.target_stack.borrow_mut().pop();
    }

    pub(crate) fn current_target(&self) -> Option<WatcherId> {
        self.target_stack.borrow().last().copied().flatten()
    }

    /// Register a dependency on the active evaluation context, if any.
    pub(crate) fn depend_on(&self, dep_id: DepId) {
        if let Some(target) = self.current_target() {
            if let Some(watcher) = self.watcher(target) {
                watcher.add_dep(dep_id);
            }
        }
    }

    // --- dependency subscriber table ---

    pub(crate) fn register_dep(&self, dep_id: DepId) {
        self.dep_subs.borrow_mut().insert(dep_id, Vec::new());
    }

    pub(crate) fn drop_dep(&self, dep_id: DepId) {
        self.dep_subs.borrow_mut().remove(&dep_id);
    }

    pub(crate) fn add_sub(&self, dep_id: DepId, watcher: WatcherId) {
        if let Some(subs) = self.dep_subs.borrow_mut().get_mut(&dep_id) {
            subs.push(watcher);
        }
    }

    pub(crate) fn remove_sub(&self, dep_id: DepId, watcher: WatcherId) {
        if let Some(subs) = self.dep_subs.borrow_mut().get_mut(&dep_id) {
            if let Some(pos) = subs.iter().position(|id| *id == watcher) {
                subs.remove(pos);
            }
        }
    }

    /// Stable snapshot of a dependency's subscribers, tolerating watchers
    /// that mutate the list mid-notification.
    pub(crate) fn subs_snapshot(&self, dep_id: DepId) -> Vec<WatcherId> {
        self.dep_subs
            .borrow()
            .get(&dep_id)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn sub_count(&self, dep_id: DepId) -> usize {
        self.dep_subs
            .borrow()
            .get(&dep_id)
            .map_or(0, |subs| subs.len())
    }

    // --- watcher registry ---

    pub(crate) fn register_watcher(&self, watcher: Rc<WatcherInner>) {
        self.watchers.borrow_mut().insert(watcher.id(), watcher);
    }

    pub(crate) fn unregister_watcher(&self, id: WatcherId) {
        self.watchers.borrow_mut().remove(&id);
    }

    pub(crate) fn watcher(&self, id: WatcherId) -> Option<Rc<WatcherInner>> {
        self.watchers.borrow().get(&id).cloned()
    }

    // --- config ---

    /// Toggle batched flushing.
    ///
    /// When disabled, notifications sort subscribers by id themselves and
    /// the scheduler flushes synchronously from `enqueue` — no microtask
    /// boundary. Mostly useful in tests.
    pub fn set_async(&self, enabled: bool) {
        self.async_mode.set(enabled);
    }

    pub(crate) fn is_async(&self) -> bool {
        self.async_mode.get()
    }

    // --- tick queue ---

    /// Queue a callback to run after the current batch of work, in the next
    /// tick drain.
    pub fn next_tick<F>(&self, cb: F)
    where
        F: FnOnce() + 'static,
    {
        tick::next_tick(self, Box::new(cb));
    }

    /// Drain the tick queue. This is the microtask boundary: the host (or a
    /// test) calls it once the synchronous stack has unwound.
    pub fn run_ticks(&self) {
        tick::run_ticks(self);
    }

    /// Install the asynchronous completion primitive.
    ///
    /// The driver is invoked whenever the first callback since the last
    /// drain is queued; it must arrange for [`Runtime::run_ticks`] to be
    /// called soon, after the current synchronous stack unwinds. Without a
    /// driver the host pumps `run_ticks` itself, at the cost of coarser
    /// batching.
    pub fn set_tick_driver<F>(&self, driver: F)
    where
        F: Fn() + 'static,
    {
        tick::set_driver(self, Rc::new(driver));
    }

    // --- errors ---

    /// Install the shared error handler.
    ///
    /// Receives evaluation and callback failures from user-registered
    /// watchers, internal watcher failures surfaced at the flush boundary,
    /// and circular-update reports. The default handler logs at error level.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ReactiveError) + 'static,
    {
        *self.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Route an error to the shared handler.
    ///
    /// Tracking is disabled while the handler runs so it cannot register
    /// dependencies on whatever evaluation triggered the failure.
    pub fn handle_error(&self, err: &ReactiveError) {
        self.push_target(None);
        let handler = self.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err),
            None => tracing::error!(error = %err, "unhandled reactive error"),
        }
        self.pop_target();
    }
}
