#![forbid(unsafe_code)]

//! The window: explicit context object for reactive containers.
//!
//! A [`Window`] owns the three collaborators every container needs:
//!
//! - the [`EntityRegistry`] of owner entities and their disposal signals,
//! - the [`FrameScheduler`] pre-update phase,
//! - the [`Dispatcher`] deferred-task queue.
//!
//! `Window` is a cheap handle (`Rc` inside); clones share one host. Containers
//! hold a [`WeakWindow`], so they never keep the window alive and fail with
//! [`StateError::Context`] once it is gone. There is no process-wide state:
//! two windows are fully independent.
//!
//! # Tick
//!
//! [`Window::tick`] runs one frame:
//!
//! 1. every pre-update callback registered at tick start, in registration
//!    order (skipping any deregistered mid-phase);
//! 2. up to [`WindowConfig::max_drain_passes`] dispatcher passes, stopping
//!    early once a pass finds the queue empty.
//!
//! A tick that starts while another tick is running on the same window is
//! refused and returns empty stats.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use kestrel_core::entity::{EntityId, EntityRegistry, HookId};
use kestrel_core::error::{Result, StateError};
use tracing::field::Empty;
use web_time::{Duration, Instant};

use crate::config::WindowConfig;
use crate::dispatcher::{Dispatcher, TargetId};
use crate::scheduler::{FrameScheduler, PreUpdateId};

/// Per-tick counters returned by [`Window::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Frame number of this tick (1-based).
    pub frame: u64,
    /// Pre-update callbacks invoked.
    pub pre_update_calls: usize,
    /// Dispatcher passes that found work.
    pub drain_passes: usize,
    /// Deferred tasks that ran.
    pub tasks_executed: usize,
    /// Deferred tasks dropped because their target was retired.
    pub tasks_dropped: usize,
    /// Tasks still queued when the tick ended.
    pub backlog: usize,
}

pub(crate) struct WindowHost {
    config: WindowConfig,
    entities: RefCell<EntityRegistry>,
    scheduler: RefCell<FrameScheduler>,
    dispatcher: RefCell<Dispatcher>,
    frame: Cell<u64>,
    ticking: Cell<bool>,
    next_state_id: Cell<u64>,
}

/// Handle to a window host.
#[derive(Clone)]
pub struct Window {
    host: Rc<WindowHost>,
}

/// Non-owning handle to a window.
#[derive(Clone, Default)]
pub struct WeakWindow {
    host: Weak<WindowHost>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("frame", &self.host.frame.get())
            .field("entities", &self.host.entities.borrow().len())
            .field("pre_update", &self.host.scheduler.borrow().len())
            .field("pending", &self.host.dispatcher.borrow().len())
            .finish()
    }
}

impl std::fmt::Debug for WeakWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakWindow")
            .field("alive", &(self.host.strong_count() > 0))
            .finish()
    }
}

impl WeakWindow {
    /// Upgrade to a live window.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if the window has been dropped.
    pub fn upgrade(&self) -> Result<Window> {
        self.host
            .upgrade()
            .map(|host| Window { host })
            .ok_or_else(|| StateError::context("window has been dropped"))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.host.strong_count() > 0
    }
}

/// Resets the re-entrancy flag even if a callback panics.
struct TickGuard<'a>(&'a Cell<bool>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

impl Window {
    #[must_use]
    pub fn new(config: WindowConfig) -> Self {
        tracing::debug!(
            message = "window.new",
            notify_policy = %config.notify_policy,
            max_drain_passes = config.max_drain_passes
        );
        Self {
            host: Rc::new(WindowHost {
                config,
                entities: RefCell::new(EntityRegistry::new()),
                scheduler: RefCell::new(FrameScheduler::new()),
                dispatcher: RefCell::new(Dispatcher::new()),
                frame: Cell::new(0),
                ticking: Cell::new(false),
                next_state_id: Cell::new(1),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WindowConfig {
        &self.host.config
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakWindow {
        WeakWindow {
            host: Rc::downgrade(&self.host),
        }
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.host.frame.get()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Window) -> bool {
        Rc::ptr_eq(&self.host, &other.host)
    }

    pub(crate) fn next_state_id(&self) -> u64 {
        let id = self.host.next_state_id.get();
        self.host.next_state_id.set(id + 1);
        id
    }

    // ── Owner entities ───────────────────────────────────────────────

    pub fn spawn_entity(&self, label: impl Into<String>) -> EntityId {
        self.host.entities.borrow_mut().spawn(label)
    }

    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.host.entities.borrow().is_alive(entity)
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.host.entities.borrow().len()
    }

    /// Attach a hook to `entity`'s disposal signal.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if `entity` is not live.
    pub fn on_disposed(
        &self,
        entity: EntityId,
        hook: impl FnOnce(EntityId) + 'static,
    ) -> Result<HookId> {
        self.host
            .entities
            .borrow_mut()
            .add_hook(entity, Box::new(hook))
    }

    pub fn remove_dispose_hook(&self, entity: EntityId, hook: HookId) -> bool {
        let removed = self.host.entities.borrow_mut().take_hook(entity, hook);
        removed.is_some()
    }

    /// Dispose an entity and raise its disposal signal.
    ///
    /// Hooks run after the entity is already stale, in registration order.
    /// Returns `false` if the entity was not live.
    pub fn dispose_entity(&self, entity: EntityId) -> bool {
        let hooks = self.host.entities.borrow_mut().retire(entity);
        let Some(hooks) = hooks else {
            return false;
        };
        tracing::debug!(message = "entity.dispose", entity = ?entity, hooks = hooks.len());
        for hook in hooks {
            hook(entity);
        }
        true
    }

    /// Dispose every live entity. Returns how many were disposed.
    pub fn close(&self) -> usize {
        let ids = self.host.entities.borrow().ids();
        let disposed = ids
            .into_iter()
            .filter(|id| self.dispose_entity(*id))
            .count();
        tracing::debug!(message = "window.close", disposed);
        disposed
    }

    // ── Pre-update phase ─────────────────────────────────────────────

    pub fn register_pre_update(&self, callback: impl Fn() + 'static) -> PreUpdateId {
        self.host
            .scheduler
            .borrow_mut()
            .register(Rc::new(callback))
    }

    pub fn unregister_pre_update(&self, id: PreUpdateId) -> bool {
        let removed = self.host.scheduler.borrow_mut().take(id);
        removed.is_some()
    }

    #[must_use]
    pub fn is_pre_update_registered(&self, id: PreUpdateId) -> bool {
        self.host.scheduler.borrow().contains(id)
    }

    #[must_use]
    pub fn pre_update_count(&self) -> usize {
        self.host.scheduler.borrow().len()
    }

    // ── Deferred work ────────────────────────────────────────────────

    /// Run `task` later on this thread, during a drain pass.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.host.dispatcher.borrow_mut().post(Box::new(task));
    }

    /// Like [`defer`](Self::defer), but the task is dropped unrun if
    /// `target` is retired first. Returns `false` if it already is.
    pub fn defer_to(&self, target: TargetId, task: impl FnOnce() + 'static) -> bool {
        self.host
            .dispatcher
            .borrow_mut()
            .post_to(target, Box::new(task))
    }

    pub fn register_target(&self) -> TargetId {
        self.host.dispatcher.borrow_mut().register_target()
    }

    /// Retire a target; returns how many queued tasks were purged.
    pub fn retire_target(&self, target: TargetId) -> usize {
        let purged = self.host.dispatcher.borrow_mut().purge_target(target);
        // Purged closures may own containers whose drop re-enters here.
        purged.len()
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.host.dispatcher.borrow().len()
    }

    #[must_use]
    pub fn dropped_tasks_total(&self) -> u64 {
        self.host.dispatcher.borrow().dropped_total()
    }

    /// Run a single dispatcher pass outside of a tick. Returns the number of
    /// tasks that ran.
    pub fn drain_deferred(&self) -> usize {
        Dispatcher::drain_pass(&self.host.dispatcher).executed
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// Run one frame: the pre-update phase, then deferred work.
    pub fn tick(&self) -> TickStats {
        if self.host.ticking.replace(true) {
            tracing::warn!(message = "window.tick.reentrant", frame = self.frame());
            return TickStats {
                frame: self.frame(),
                ..TickStats::default()
            };
        }
        let _guard = TickGuard(&self.host.ticking);

        let frame = self.host.frame.get() + 1;
        self.host.frame.set(frame);
        let started = Instant::now();
        let span = tracing::debug_span!(
            "window.tick",
            frame,
            pre_update_calls = Empty,
            tasks_executed = Empty,
            tasks_dropped = Empty,
            duration_us = Empty
        );
        let _enter = span.enter();

        let mut stats = TickStats {
            frame,
            ..TickStats::default()
        };

        let snapshot = self.host.scheduler.borrow().snapshot();
        for (id, callback) in snapshot {
            if !self.is_pre_update_registered(id) {
                continue;
            }
            callback();
            stats.pre_update_calls += 1;
        }

        for _ in 0..self.host.config.effective_drain_passes() {
            let pass = Dispatcher::drain_pass(&self.host.dispatcher);
            if pass.is_idle() {
                break;
            }
            stats.drain_passes += 1;
            stats.tasks_executed += pass.executed;
            stats.tasks_dropped += pass.dropped;
        }

        stats.backlog = self.pending_tasks();
        if stats.backlog > 0 {
            tracing::warn!(
                message = "window.tick.backlog",
                frame,
                backlog = stats.backlog,
                passes = stats.drain_passes
            );
        }

        span.record("pre_update_calls", stats.pre_update_calls);
        span.record("tasks_executed", stats.tasks_executed);
        span.record("tasks_dropped", stats.tasks_dropped);
        span.record("duration_us", saturating_micros(started.elapsed()));
        stats
    }
}

fn saturating_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyPolicy;

    #[test]
    fn tick_runs_pre_update_then_deferred() {
        let window = Window::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let w = window.clone();
        let l = Rc::clone(&log);
        window.register_pre_update(move || {
            l.borrow_mut().push("pre");
            let l2 = Rc::clone(&l);
            w.defer(move || l2.borrow_mut().push("deferred"));
        });

        let stats = window.tick();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.pre_update_calls, 1);
        assert_eq!(stats.tasks_executed, 1);
        assert_eq!(*log.borrow(), vec!["pre", "deferred"]);
    }

    #[test]
    fn callback_registered_mid_tick_runs_next_tick() {
        let window = Window::default();
        let count = Rc::new(Cell::new(0));

        let w = window.clone();
        let c = Rc::clone(&count);
        let registered = Rc::new(Cell::new(false));
        window.register_pre_update(move || {
            if !registered.replace(true) {
                let c = Rc::clone(&c);
                w.register_pre_update(move || c.set(c.get() + 1));
            }
        });

        assert_eq!(window.tick().pre_update_calls, 1);
        assert_eq!(count.get(), 0);
        assert_eq!(window.tick().pre_update_calls, 2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn callback_unregistered_mid_tick_is_skipped() {
        let window = Window::default();
        let ran = Rc::new(Cell::new(false));
        let victim_id: Rc<Cell<Option<PreUpdateId>>> = Rc::new(Cell::new(None));

        let w = window.clone();
        let v = Rc::clone(&victim_id);
        window.register_pre_update(move || {
            if let Some(id) = v.get() {
                w.unregister_pre_update(id);
            }
        });
        let r = Rc::clone(&ran);
        let id = window.register_pre_update(move || r.set(true));
        victim_id.set(Some(id));

        let stats = window.tick();
        assert_eq!(stats.pre_update_calls, 1);
        assert!(!ran.get());
        assert_eq!(window.pre_update_count(), 1);
    }

    #[test]
    fn reentrant_tick_is_refused() {
        let window = Window::default();
        let inner_stats = Rc::new(Cell::new(None));

        let w = window.clone();
        let s = Rc::clone(&inner_stats);
        window.register_pre_update(move || s.set(Some(w.tick())));

        let outer = window.tick();
        assert_eq!(outer.pre_update_calls, 1);
        let inner = inner_stats.get().unwrap();
        assert_eq!(inner.pre_update_calls, 0);
        assert_eq!(window.frame(), 1);
    }

    #[test]
    fn drain_budget_leaves_backlog() {
        let window = Window::new(WindowConfig::default().with_max_drain_passes(1));

        let w = window.clone();
        window.defer(move || w.defer(|| {}));

        let stats = window.tick();
        assert_eq!(stats.tasks_executed, 1);
        assert_eq!(stats.backlog, 1);

        let stats = window.tick();
        assert_eq!(stats.tasks_executed, 1);
        assert_eq!(stats.backlog, 0);
    }

    #[test]
    fn dispose_entity_runs_hooks_once() {
        let window = Window::default();
        let entity = window.spawn_entity("panel");
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        window
            .on_disposed(entity, move |_| h.set(h.get() + 1))
            .unwrap();

        assert!(window.dispose_entity(entity));
        assert!(!window.dispose_entity(entity));
        assert_eq!(hits.get(), 1);
        assert!(!window.is_alive(entity));
    }

    #[test]
    fn hook_may_touch_the_registry() {
        let window = Window::default();
        let parent = window.spawn_entity("parent");
        let child = window.spawn_entity("child");

        let w = window.clone();
        window
            .on_disposed(parent, move |_| {
                w.dispose_entity(child);
            })
            .unwrap();

        window.dispose_entity(parent);
        assert!(!window.is_alive(child));
        assert_eq!(window.entity_count(), 0);
    }

    #[test]
    fn close_disposes_everything() {
        let window = Window::default();
        for n in 0..3 {
            window.spawn_entity(format!("e{n}"));
        }
        assert_eq!(window.close(), 3);
        assert_eq!(window.entity_count(), 0);
    }

    #[test]
    fn weak_window_reports_context_error_after_drop() {
        let window = Window::new(WindowConfig::default().with_notify_policy(NotifyPolicy::Immediate));
        let weak = window.downgrade();
        assert!(weak.upgrade().is_ok());
        drop(window);
        assert!(!weak.is_alive());
        assert!(matches!(weak.upgrade(), Err(StateError::Context { .. })));
    }

    #[test]
    #[tracing_test::traced_test]
    fn backlog_and_reentry_are_logged() {
        let window = Window::new(WindowConfig::default().with_max_drain_passes(1));
        let w = window.clone();
        window.defer(move || {
            w.defer(|| {});
            w.tick();
        });
        window.tick();
        assert!(logs_contain("window.tick.reentrant"));
        assert!(logs_contain("window.tick.backlog"));
    }

    #[test]
    fn tick_duration_saturates() {
        assert_eq!(saturating_micros(Duration::from_micros(7)), 7);
        assert_eq!(saturating_micros(Duration::MAX), u64::MAX);
    }
}
