#![forbid(unsafe_code)]

//! Same-thread deferred task queue.
//!
//! The [`Dispatcher`] decouples "a value changed" from "listeners ran". Tasks
//! are plain `FnOnce()` closures executed later on the same thread, in FIFO
//! order, by [`Dispatcher::drain_pass`].
//!
//! # Targets
//!
//! A task may be bound to a [`TargetId`]. Retiring the target purges its
//! queued tasks, and a task whose target was retired after the pass started
//! is skipped when its turn comes. Either way the task is dropped without
//! running and counted in [`dropped_total`](Dispatcher::dropped_total).
//! Target ids are generation-checked, so a retired id never matches a newer
//! target that reuses its slot.
//!
//! # Passes
//!
//! A pass takes the queue as it stands when the pass starts and runs it to
//! completion. Tasks enqueued while the pass runs wait for the next pass, so
//! a task that keeps re-enqueueing itself cannot starve the frame.

use std::cell::RefCell;
use std::collections::VecDeque;

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Liveness token for tasks that must not outlive their target.
    pub struct TargetId;
}

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// A queued task and the target it is bound to, if any.
pub struct QueuedTask {
    target: Option<TargetId>,
    task: Task,
}

impl QueuedTask {
    #[must_use]
    pub fn target(&self) -> Option<TargetId> {
        self.target
    }

    pub fn run(self) {
        (self.task)();
    }
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Tasks that ran.
    pub executed: usize,
    /// Tasks skipped because their target was retired.
    pub dropped: usize,
}

impl PassStats {
    /// Whether the pass found any work at all.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.executed == 0 && self.dropped == 0
    }
}

/// FIFO queue of deferred tasks.
#[derive(Default)]
pub struct Dispatcher {
    queue: VecDeque<QueuedTask>,
    targets: SlotMap<TargetId, ()>,
    executed_total: u64,
    dropped_total: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &self.queue.len())
            .field("targets", &self.targets.len())
            .field("executed_total", &self.executed_total)
            .field("dropped_total", &self.dropped_total)
            .finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_target(&mut self) -> TargetId {
        self.targets.insert(())
    }

    /// Retire a target and purge its queued tasks.
    ///
    /// Returns the number of tasks purged. Retiring twice is a no-op.
    pub fn retire_target(&mut self, target: TargetId) -> usize {
        self.purge_target(target).len()
    }

    /// Like [`retire_target`](Self::retire_target), but hands the purged
    /// tasks back so the caller can drop them outside any borrow.
    pub fn purge_target(&mut self, target: TargetId) -> Vec<QueuedTask> {
        if self.targets.remove(target).is_none() {
            return Vec::new();
        }
        let (purged, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|queued| queued.target == Some(target));
        self.queue = kept.into();
        self.dropped_total += purged.len() as u64;
        purged
    }

    #[must_use]
    pub fn is_live(&self, target: TargetId) -> bool {
        self.targets.contains_key(target)
    }

    /// Enqueue an unbound task.
    pub fn post(&mut self, task: Task) {
        self.queue.push_back(QueuedTask { target: None, task });
    }

    /// Enqueue a task bound to `target`.
    ///
    /// Returns `false`, dropping the task, if the target is already retired.
    pub fn post_to(&mut self, target: TargetId, task: Task) -> bool {
        if !self.is_live(target) {
            self.dropped_total += 1;
            return false;
        }
        self.queue.push_back(QueuedTask {
            target: Some(target),
            task,
        });
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn executed_total(&self) -> u64 {
        self.executed_total
    }

    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Take everything queued right now, leaving the queue empty.
    pub fn take_batch(&mut self) -> VecDeque<QueuedTask> {
        std::mem::take(&mut self.queue)
    }

    /// Decide whether a task taken in a batch may still run, and count it.
    pub fn admit(&mut self, queued: &QueuedTask) -> bool {
        match queued.target {
            Some(target) if !self.is_live(target) => {
                self.dropped_total += 1;
                false
            }
            _ => {
                self.executed_total += 1;
                true
            }
        }
    }

    /// Run one pass over the tasks queued when the pass starts.
    ///
    /// The dispatcher is never borrowed while a task runs, so tasks may post
    /// new work or retire targets.
    ///
    /// If a task panics, the tasks after it go back to the front of the
    /// queue for the next pass.
    pub fn drain_pass(cell: &RefCell<Self>) -> PassStats {
        let mut batch = Requeue {
            cell,
            rest: cell.borrow_mut().take_batch(),
        };
        let mut stats = PassStats::default();
        while let Some(queued) = batch.rest.pop_front() {
            let admitted = cell.borrow_mut().admit(&queued);
            if admitted {
                queued.run();
                stats.executed += 1;
            } else {
                stats.dropped += 1;
            }
        }
        stats
    }
}

/// Unrun remainder of a batch, restored ahead of newer work on unwind.
struct Requeue<'a> {
    cell: &'a RefCell<Dispatcher>,
    rest: VecDeque<QueuedTask>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        if self.rest.is_empty() {
            return;
        }
        let Ok(mut dispatcher) = self.cell.try_borrow_mut() else {
            return;
        };
        let newer = std::mem::replace(&mut dispatcher.queue, std::mem::take(&mut self.rest));
        dispatcher.queue.extend(newer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let cell = RefCell::new(Dispatcher::new());
        for n in 0..4 {
            let log = Rc::clone(&log);
            cell.borrow_mut()
                .post(Box::new(move || log.borrow_mut().push(n)));
        }
        let stats = Dispatcher::drain_pass(&cell);
        assert_eq!(stats.executed, 4);
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
        assert!(cell.borrow().is_empty());
    }

    #[test]
    fn tasks_posted_during_pass_wait_for_next_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let cell = Rc::new(RefCell::new(Dispatcher::new()));

        let inner_log = Rc::clone(&log);
        let inner_cell = Rc::clone(&cell);
        cell.borrow_mut().post(Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let nested_log = Rc::clone(&inner_log);
            inner_cell
                .borrow_mut()
                .post(Box::new(move || nested_log.borrow_mut().push("nested")));
        }));

        let first = Dispatcher::drain_pass(&cell);
        assert_eq!(first.executed, 1);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(cell.borrow().len(), 1);

        let second = Dispatcher::drain_pass(&cell);
        assert_eq!(second.executed, 1);
        assert_eq!(*log.borrow(), vec!["outer", "nested"]);
        assert!(Dispatcher::drain_pass(&cell).is_idle());
    }

    #[test]
    fn retire_purges_queued_tasks() {
        let ran = Rc::new(RefCell::new(0));
        let cell = RefCell::new(Dispatcher::new());
        let target = cell.borrow_mut().register_target();
        for _ in 0..3 {
            let ran = Rc::clone(&ran);
            assert!(
                cell.borrow_mut()
                    .post_to(target, Box::new(move || *ran.borrow_mut() += 1))
            );
        }
        assert_eq!(cell.borrow_mut().retire_target(target), 3);
        assert!(Dispatcher::drain_pass(&cell).is_idle());
        assert_eq!(*ran.borrow(), 0);
        assert_eq!(cell.borrow().dropped_total(), 3);
    }

    #[test]
    fn target_retired_mid_pass_is_skipped() {
        let ran = Rc::new(RefCell::new(Vec::new()));
        let cell = Rc::new(RefCell::new(Dispatcher::new()));
        let target = cell.borrow_mut().register_target();

        let retire_cell = Rc::clone(&cell);
        cell.borrow_mut().post(Box::new(move || {
            retire_cell.borrow_mut().retire_target(target);
        }));
        let ran_clone = Rc::clone(&ran);
        cell.borrow_mut()
            .post_to(target, Box::new(move || ran_clone.borrow_mut().push(1)));

        let stats = Dispatcher::drain_pass(&cell);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.dropped, 1);
        assert!(ran.borrow().is_empty());
    }

    #[test]
    fn post_to_retired_target_is_rejected() {
        let mut dispatcher = Dispatcher::new();
        let target = dispatcher.register_target();
        dispatcher.retire_target(target);
        assert!(!dispatcher.post_to(target, Box::new(|| {})));
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dropped_total(), 1);
        assert_eq!(dispatcher.retire_target(target), 0);
    }

    #[test]
    fn stale_target_does_not_match_reused_slot() {
        let mut dispatcher = Dispatcher::new();
        let old = dispatcher.register_target();
        dispatcher.retire_target(old);
        let new = dispatcher.register_target();
        assert!(!dispatcher.is_live(old));
        assert!(dispatcher.is_live(new));
    }

    #[test]
    fn purge_keeps_other_tasks_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let cell = RefCell::new(Dispatcher::new());
        let doomed = cell.borrow_mut().register_target();
        let kept = cell.borrow_mut().register_target();
        for n in 0..6 {
            let log = Rc::clone(&log);
            let target = if n % 2 == 0 { doomed } else { kept };
            cell.borrow_mut()
                .post_to(target, Box::new(move || log.borrow_mut().push(n)));
        }

        let purged = cell.borrow_mut().purge_target(doomed);
        assert_eq!(purged.len(), 3);
        assert_eq!(cell.borrow().len(), 3);

        Dispatcher::drain_pass(&cell);
        assert_eq!(*log.borrow(), vec![1, 3, 5]);
    }

    #[test]
    fn panicking_task_requeues_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let cell = RefCell::new(Dispatcher::new());
        cell.borrow_mut().post(Box::new(|| panic!("task failed")));
        for n in 0..2 {
            let log = Rc::clone(&log);
            cell.borrow_mut()
                .post(Box::new(move || log.borrow_mut().push(n)));
        }

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Dispatcher::drain_pass(&cell)
        }));
        assert!(outcome.is_err());
        assert_eq!(cell.borrow().len(), 2);

        let log2 = Rc::clone(&log);
        cell.borrow_mut().post(Box::new(move || log2.borrow_mut().push(9)));
        let stats = Dispatcher::drain_pass(&cell);
        assert_eq!(stats.executed, 3);
        assert_eq!(*log.borrow(), vec![0, 1, 9]);
    }
}
