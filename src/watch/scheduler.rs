use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::ReactiveError;
use crate::runtime::Runtime;
use crate::watch::watcher::WatcherInner;

/// How often a watcher may re-trigger itself within one flush before the
/// scheduler declares an update cycle and aborts.
pub const MAX_UPDATE_COUNT: u32 = 100;

/// Pending watchers awaiting a flush, plus the flush bookkeeping.
#[derive(Default)]
pub(crate) struct SchedulerState {
    queue: Vec<Rc<WatcherInner>>,
    // presence set: a watcher id is queued at most once per flush
    has: HashSet<usize>,
    circular: HashMap<usize, u32>,
    post_flush: Vec<Box<dyn FnOnce()>>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

enum Wakeup {
    None,
    FlushNow,
    Schedule,
}

/// Push a watcher into the queue, deduplicated by id.
///
/// During a flush the watcher is instead inserted at its sorted position
/// relative to the live cursor: id order is respected, except entries the
/// cursor already passed are never re-ordered backward — a smaller-id
/// watcher enqueued late still runs in this same flush, immediately next.
pub(crate) fn queue_watcher(runtime: &Rc<Runtime>, watcher: Rc<WatcherInner>) {
    let id = watcher.id();
    let wakeup = {
        let mut state = runtime.scheduler.borrow_mut();
        if state.has.contains(&id) {
            return;
        }
        state.has.insert(id);
        trace!(watcher = id, "queueing watcher");
        if !state.flushing {
            state.queue.push(watcher);
        } else {
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        }
        if state.waiting {
            Wakeup::None
        } else {
            state.waiting = true;
            if runtime.is_async() {
                Wakeup::Schedule
            } else {
                Wakeup::FlushNow
            }
        }
    };
    match wakeup {
        Wakeup::None => {}
        Wakeup::FlushNow => flush_scheduler_queue(runtime),
        Wakeup::Schedule => {
            let rt = Rc::clone(runtime);
            runtime.next_tick(move || flush_scheduler_queue(&rt));
        }
    }
}

/// Queue a callback for the first post-flush pass. Post-flush callbacks run
/// strictly after every watcher in the batch has settled; outside a flush
/// they run at the end of the next one.
pub fn post_flush<F>(cb: F)
where
    F: FnOnce() + 'static,
{
    let runtime = Runtime::current();
    runtime.scheduler.borrow_mut().post_flush.push(Box::new(cb));
}

/// Run every pending watcher in ascending id order.
///
/// Id order approximates creation order, which approximates dependency
/// depth, so a computation refreshes before anything created after it that
/// depends on it. The loop re-reads the queue length each iteration because
/// running a watcher may enqueue more.
pub(crate) fn flush_scheduler_queue(runtime: &Rc<Runtime>) {
    {
        let mut state = runtime.scheduler.borrow_mut();
        state.flushing = true;
        state.queue.sort_by_key(|watcher| watcher.id());
        debug!(pending = state.queue.len(), "flushing scheduler queue");
    }

    loop {
        let watcher = {
            let state = runtime.scheduler.borrow();
            if state.index >= state.queue.len() {
                break;
            }
            Rc::clone(&state.queue[state.index])
        };
        if let Some(before) = &watcher.before {
            before();
        }
        let id = watcher.id();
        // clear the pending mark before running, so a watcher that
        // re-triggers itself is re-queued rather than dropped
        runtime.scheduler.borrow_mut().has.remove(&id);
        if let Err(err) = watcher.run() {
            // this watcher failed; the rest of the flush continues
            runtime.handle_error(&err);
        }
        let cycle_detected = {
            let mut state = runtime.scheduler.borrow_mut();
            if state.has.contains(&id) {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                *count > MAX_UPDATE_COUNT
            } else {
                false
            }
        };
        if cycle_detected {
            runtime.handle_error(&ReactiveError::CircularUpdate { watcher: id });
            break;
        }
        runtime.scheduler.borrow_mut().index += 1;
    }

    // keep copies of the post queues before resetting state
    let (callbacks, settled) = {
        let mut state = runtime.scheduler.borrow_mut();
        let callbacks = std::mem::take(&mut state.post_flush);
        let settled = std::mem::take(&mut state.queue);
        state.has.clear();
        state.circular.clear();
        state.index = 0;
        state.waiting = false;
        state.flushing = false;
        (callbacks, settled)
    };

    for cb in callbacks {
        cb();
    }
    for watcher in settled.iter().rev() {
        if watcher.is_active() {
            if let Some(updated) = &watcher.updated {
                updated();
            }
        }
    }
}
