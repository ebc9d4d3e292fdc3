//! Single-threaded, two-band task queue.
//!
//! # Design
//! Intercepted requests never touch an event loop, so deferred work is queued
//! here and run when the caller drives the scheduler. There are two bands:
//!
//! - **deferred**: runs after the current synchronous work. `drain` and
//!   `continue` go here. Tasks deferred while the band is draining run in the
//!   same drain, after everything queued before them.
//! - **next turn**: runs on the following turn. A turn takes the next-turn
//!   tasks that were queued when it started and runs them one by one,
//!   draining the deferred band after each.
//!
//! Both bands are FIFO, so deferrals made in one synchronous turn fire in the
//! order they were scheduled and before anything scheduled in a later turn.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// Shared handle to a task queue. Clones drive the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    deferred: RefCell<VecDeque<Task>>,
    next_turn: RefCell<VecDeque<Task>>,
    turns: Cell<u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run after the current synchronous work.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.deferred.borrow_mut().push_back(Box::new(task));
    }

    /// Queue `task` to run on the next turn.
    pub fn next_turn(&self, task: impl FnOnce() + 'static) {
        self.inner.next_turn.borrow_mut().push_back(Box::new(task));
    }

    /// Run deferred tasks until the band is empty. Returns how many ran.
    pub fn run_deferred(&self) -> usize {
        let mut ran = 0;
        // The borrow must end before the task runs: tasks may defer more work.
        while let Some(task) = self.pop(&self.inner.deferred) {
            task();
            ran += 1;
        }
        ran
    }

    /// Run one turn: the deferred band first, then every next-turn task that
    /// was queued when the turn started. Returns how many tasks ran.
    pub fn turn(&self) -> usize {
        let mut ran = self.run_deferred();
        let batch = self.inner.next_turn.borrow().len();
        for _ in 0..batch {
            let Some(task) = self.pop(&self.inner.next_turn) else {
                break;
            };
            task();
            ran += 1;
            ran += self.run_deferred();
        }
        self.inner.turns.set(self.inner.turns.get() + 1);
        tracing::trace!(turn = self.inner.turns.get(), tasks = ran, "scheduler turn");
        ran
    }

    /// Run turns until both bands are empty. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while !self.is_idle() {
            ran += self.turn();
        }
        ran
    }

    /// Number of queued tasks across both bands.
    pub fn pending(&self) -> usize {
        self.inner.deferred.borrow().len() + self.inner.next_turn.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Number of completed turns.
    pub fn turns(&self) -> u64 {
        self.inner.turns.get()
    }

    fn pop(&self, band: &RefCell<VecDeque<Task>>) -> Option<Task> {
        band.borrow_mut().pop_front()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("deferred", &self.inner.deferred.borrow().len())
            .field("next_turn", &self.inner.next_turn.borrow().len())
            .field("turns", &self.inner.turns.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> Box<dyn FnOnce()> {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn nothing_runs_synchronously() {
        let scheduler = Scheduler::new();
        let (log, task) = recorder();
        scheduler.defer(task("a"));
        scheduler.next_turn(task("b"));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn deferred_band_runs_before_next_turn_band() {
        let scheduler = Scheduler::new();
        let (log, task) = recorder();
        scheduler.next_turn(task("turn-1"));
        scheduler.defer(task("deferred-1"));
        scheduler.next_turn(task("turn-2"));
        scheduler.defer(task("deferred-2"));

        assert_eq!(scheduler.run_until_idle(), 4);
        assert_eq!(*log.borrow(), vec!["deferred-1", "deferred-2", "turn-1", "turn-2"]);
    }

    #[test]
    fn work_deferred_inside_a_task_keeps_fifo_order() {
        let scheduler = Scheduler::new();
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let nested = task("nested");
        scheduler.defer(move || inner.defer(nested));
        scheduler.defer(task("second"));

        scheduler.run_deferred();
        assert_eq!(*log.borrow(), vec!["second", "nested"]);
    }

    #[test]
    fn deferred_work_from_a_turn_task_runs_before_the_next_turn_task() {
        let scheduler = Scheduler::new();
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let from_turn = task("deferred-from-turn");
        let first = task("turn-1");
        scheduler.next_turn(move || {
            first();
            inner.defer(from_turn);
        });
        scheduler.next_turn(task("turn-2"));

        scheduler.turn();
        assert_eq!(*log.borrow(), vec!["turn-1", "deferred-from-turn", "turn-2"]);
    }

    #[test]
    fn next_turn_work_queued_during_a_turn_waits_for_the_following_turn() {
        let scheduler = Scheduler::new();
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let later = task("later");
        scheduler.next_turn(move || inner.next_turn(later));

        assert_eq!(scheduler.turn(), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.turn(), 1);
        assert_eq!(*log.borrow(), vec!["later"]);
        assert_eq!(scheduler.turns(), 2);
    }

    #[test]
    fn idle_scheduler_runs_nothing() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.run_until_idle(), 0);
    }
}
