use std::rc::{Rc, Weak};

use crate::runtime::Runtime;

/// A dependency: the registry of subscribers interested in one observable
/// slot (one map entry, or one container's shape).
///
/// `Dep` is a cheap-clone handle; the subscriber list itself lives in the
/// runtime's tables, keyed by the dep's id, so watcher bookkeeping is
/// set-difference over integer ids rather than pointer webs. Dropping the
/// last handle removes the table entry.
pub struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    id: usize,
    runtime: Weak<Runtime>,
}

impl Dep {
    pub(crate) fn new() -> Self {
        let runtime = Runtime::current();
        let id = runtime.next_id();
        runtime.register_dep(id);
        Dep {
            inner: Rc::new(DepInner {
                id,
                runtime: Rc::downgrade(&runtime),
            }),
        }
    }

    /// Unique id, also used as the key in watcher dep sets.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    fn runtime(&self) -> Option<Rc<Runtime>> {
        self.inner.runtime.upgrade()
    }

    /// Register the active evaluation context as a subscriber of this slot.
    /// Idempotent within one evaluation: the watcher's id sets filter
    /// repeated reads.
    pub(crate) fn depend(&self) {
        if let Some(runtime) = self.runtime() {
            runtime.depend_on(self.inner.id);
        }
    }

    /// Notify all subscribers. Works over a stable snapshot so subscribers
    /// may mutate the list mid-iteration; in non-batched mode the snapshot
    /// is sorted by watcher id, since no scheduler will order the runs.
    pub(crate) fn notify(&self) {
        let Some(runtime) = self.runtime() else {
            return;
        };
        let mut subs = runtime.subs_snapshot(self.inner.id);
        if !runtime.is_async() {
            subs.sort_unstable();
        }
        for id in subs {
            if let Some(watcher) = runtime.watcher(id) {
                watcher.update();
            }
        }
    }
}

impl Clone for Dep {
    fn clone(&self) -> Self {
        Dep {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Drop for DepInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.drop_dep(self.id);
        }
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep").field("id", &self.inner.id).finish()
    }
}
