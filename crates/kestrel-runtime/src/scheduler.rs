#![forbid(unsafe_code)]

//! Pre-update phase of the frame loop.
//!
//! [`FrameScheduler`] holds the zero-argument callbacks a window runs once
//! per tick, before deferred work is drained. Automatic reactive containers
//! register here at construction and deregister on disposal.
//!
//! # Invariants
//!
//! 1. Callbacks run in registration order.
//! 2. A tick runs over a [`snapshot`](FrameScheduler::snapshot) taken when
//!    the phase starts: callbacks registered during the phase first run on
//!    the next tick.
//! 3. A callback deregistered during the phase is skipped if it has not run
//!    yet (the caller re-checks [`contains`](FrameScheduler::contains)
//!    before each invocation).
//!
//! No callback may rely on running before or after another one.

use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Handle to a registered pre-update callback.
    pub struct PreUpdateId;
}

/// Callback invoked once per tick.
pub type PreUpdateFn = Rc<dyn Fn()>;

/// Registration-ordered set of pre-update callbacks.
#[derive(Default)]
pub struct FrameScheduler {
    callbacks: SlotMap<PreUpdateId, PreUpdateFn>,
    order: Vec<PreUpdateId>,
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("registered", &self.order.len())
            .finish()
    }
}

impl FrameScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: PreUpdateFn) -> PreUpdateId {
        let id = self.callbacks.insert(callback);
        self.order.push(id);
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: PreUpdateId) -> bool {
        self.take(id).is_some()
    }

    /// Remove a callback and return it.
    pub fn take(&mut self, id: PreUpdateId) -> Option<PreUpdateFn> {
        let callback = self.callbacks.remove(id)?;
        self.order.retain(|entry| *entry != id);
        Some(callback)
    }

    #[must_use]
    pub fn contains(&self, id: PreUpdateId) -> bool {
        self.callbacks.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stable copy of the current callbacks, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(PreUpdateId, PreUpdateFn)> {
        self.order
            .iter()
            .filter_map(|id| self.callbacks.get(*id).map(|cb| (*id, Rc::clone(cb))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<u32>>>, n: u32) -> PreUpdateFn {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(n))
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = FrameScheduler::new();
        for n in [3, 1, 2] {
            sched.register(recorder(&log, n));
        }
        for (_, cb) in sched.snapshot() {
            cb();
        }
        assert_eq!(*log.borrow(), vec![3, 1, 2]);
    }

    #[test]
    fn unregister_removes_from_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = FrameScheduler::new();
        let a = sched.register(recorder(&log, 1));
        let _b = sched.register(recorder(&log, 2));

        assert!(sched.unregister(a));
        assert!(!sched.unregister(a));
        assert!(!sched.contains(a));
        assert_eq!(sched.len(), 1);

        for (_, cb) in sched.snapshot() {
            cb();
        }
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn reregistration_goes_to_the_back() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = FrameScheduler::new();
        let a = sched.register(recorder(&log, 1));
        sched.register(recorder(&log, 2));
        sched.unregister(a);
        sched.register(recorder(&log, 1));

        for (_, cb) in sched.snapshot() {
            cb();
        }
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = FrameScheduler::new();
        sched.register(recorder(&log, 1));
        let snap = sched.snapshot();
        sched.register(recorder(&log, 2));
        assert_eq!(snap.len(), 1);
        assert_eq!(sched.len(), 2);
    }
}
