use std::rc::Rc;

use crate::runtime::Runtime;

type TickCallback = Box<dyn FnOnce()>;

/// Pending tick callbacks plus the single-schedule flag.
#[derive(Default)]
pub(crate) struct TickState {
    callbacks: Vec<TickCallback>,
    pending: bool,
    driver: Option<Rc<dyn Fn()>>,
}

/// Queue a callback for the next drain. The driver is invoked at most once
/// per drain, on the first callback queued since the last one.
pub(crate) fn next_tick(runtime: &Runtime, cb: TickCallback) {
    let driver = {
        let mut ticks = runtime.ticks.borrow_mut();
        ticks.callbacks.push(cb);
        if ticks.pending {
            None
        } else {
            ticks.pending = true;
            ticks.driver.clone()
        }
    };
    if let Some(driver) = driver {
        driver();
    }
}

/// Drain the queue. Callbacks queued while draining land in the next drain;
/// the copy is taken up front.
pub(crate) fn run_ticks(runtime: &Runtime) {
    let callbacks = {
        let mut ticks = runtime.ticks.borrow_mut();
        ticks.pending = false;
        std::mem::take(&mut ticks.callbacks)
    };
    for cb in callbacks {
        cb();
    }
}

pub(crate) fn set_driver(runtime: &Runtime, driver: Rc<dyn Fn()>) {
    runtime.ticks.borrow_mut().driver = Some(driver);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn callbacks_run_once_in_order() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let log = Rc::new(Cell::new(0));

            let first = Rc::clone(&log);
            runtime.next_tick(move || first.set(first.get() * 10 + 1));
            let second = Rc::clone(&log);
            runtime.next_tick(move || second.set(second.get() * 10 + 2));

            assert_eq!(log.get(), 0);
            runtime.run_ticks();
            assert_eq!(log.get(), 12);
            runtime.run_ticks();
            assert_eq!(log.get(), 12);
        });
    }

    #[test]
    fn callbacks_queued_while_draining_wait_for_next_drain() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let hits = Rc::new(Cell::new(0));

            let outer_hits = Rc::clone(&hits);
            let rt = Rc::clone(&runtime);
            runtime.next_tick(move || {
                outer_hits.set(outer_hits.get() + 1);
                let inner_hits = Rc::clone(&outer_hits);
                rt.next_tick(move || inner_hits.set(inner_hits.get() + 1));
            });

            runtime.run_ticks();
            assert_eq!(hits.get(), 1);
            runtime.run_ticks();
            assert_eq!(hits.get(), 2);
        });
    }

    #[test]
    fn driver_fires_once_per_batch() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let scheduled = Rc::new(Cell::new(0));

            let marks = Rc::clone(&scheduled);
            runtime.set_tick_driver(move || marks.set(marks.get() + 1));

            runtime.next_tick(|| {});
            runtime.next_tick(|| {});
            assert_eq!(scheduled.get(), 1);

            runtime.run_ticks();
            runtime.next_tick(|| {});
            assert_eq!(scheduled.get(), 2);
        });
    }
}
