#![forbid(unsafe_code)]

//! Prioritized reactive value container.
//!
//! # Design
//!
//! [`State<T>`] wraps a contributor set, a resolver, a processor, and the
//! last published value in shared, reference-counted storage. Cloning a
//! `State` creates a new handle to the **same** container.
//!
//! A resolution pass builds the active contributor list, asks the resolver
//! for a winner, evaluates it, runs the processor, and compares the result
//! with the cached value. Only a change (or a forced pass) publishes a
//! notification, so subscribers hear about effective value changes, never
//! about raw contributor mutations.
//!
//! Containers bind to their window and owner through handles only: a
//! [`WeakWindow`] and a generation-checked [`EntityId`]. Neither keeps the
//! other alive. Window-side registrations (pre-update callback, owner
//! disposal hook, dispatcher target) capture a `Weak` back to the container.
//!
//! # Invariants
//!
//! 1. Caller priority `p` is stored at `p + 1`; the default contributor sits
//!    alone at stored priority 0 and is never displaced.
//! 2. While alive, the contributor set is never empty.
//! 3. `version` increments exactly once per effective cache change.
//! 4. No internal borrow is held while providers, resolvers, processors, or
//!    subscribers run, so any of them may read this container.
//! 5. After [`dispose`](State::dispose) the container holds no contributors,
//!    subscribers, or window registrations, and every operation other than
//!    the read-only introspection getters fails with
//!    [`StateError::Disposed`].
//!
//! # Failure Modes
//!
//! - **Provider, resolver, or processor panics**: the panic unwinds to the
//!   caller of the triggering operation. The cache keeps its previous value
//!   and the container stays usable.
//! - **Window dropped**: disposal becomes a local teardown; a change that
//!   needs to schedule a deferred notification fails with
//!   [`StateError::Context`] after the cache is updated.
//! - **Last handle dropped without `dispose`**: the container deregisters
//!   itself from the window on drop.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use kestrel_core::entity::{EntityId, HookId};
use kestrel_core::error::{Result, StateError};

use super::contributor::{Contributor, ContributorSet, Provider, stored_priority};
use super::processor::Processor;
use super::resolver::{HighestPriorityWins, Resolver};
use crate::config::NotifyPolicy;
use crate::dispatcher::TargetId;
use crate::scheduler::PreUpdateId;
use crate::window::{WeakWindow, Window};

/// Object-style change observer.
///
/// Containers hold listener objects weakly: a listener dropped by its owner
/// is pruned before the next delivery.
pub trait StateListener<T> {
    fn on_state_changed(&self, value: &T);
}

/// Window-unique container id, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle returned by the `subscribe*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Subscriber<T> {
    Callback(Rc<dyn Fn(&T)>),
    Listener(Weak<dyn StateListener<T>>),
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Callback(f) => Self::Callback(Rc::clone(f)),
            Self::Listener(w) => Self::Listener(Weak::clone(w)),
        }
    }
}

impl<T> Subscriber<T> {
    fn is_live(&self) -> bool {
        match self {
            Self::Callback(_) => true,
            Self::Listener(w) => w.strong_count() > 0,
        }
    }

    fn notify(&self, value: &T) {
        match self {
            Self::Callback(f) => f(value),
            Self::Listener(w) => {
                if let Some(listener) = w.upgrade() {
                    listener.on_state_changed(value);
                }
            }
        }
    }
}

/// Window-side registrations, released together.
struct Registrations {
    window: WeakWindow,
    owner: EntityId,
    owner_hook: Option<HookId>,
    pre_update: Option<PreUpdateId>,
    target: Option<TargetId>,
}

impl Registrations {
    fn release(self) {
        let Ok(window) = self.window.upgrade() else {
            return;
        };
        if let Some(id) = self.pre_update {
            window.unregister_pre_update(id);
        }
        if let Some(hook) = self.owner_hook {
            // Already gone when disposal came from the owner itself.
            window.remove_dispose_hook(self.owner, hook);
        }
        if let Some(target) = self.target {
            window.retire_target(target);
        }
    }
}

struct StateInner<T> {
    id: StateId,
    label: Option<&'static str>,
    window: WeakWindow,
    owner: EntityId,
    owner_hook: Option<HookId>,
    pre_update: Option<PreUpdateId>,
    target: Option<TargetId>,
    policy: NotifyPolicy,
    manual: bool,
    ignore_default: bool,
    contributors: ContributorSet<T>,
    resolver: Option<Rc<dyn Resolver<T>>>,
    processor: Option<Processor<T>>,
    /// Last resolved, processed value (None only after disposal).
    cached: Option<T>,
    /// Last value handed to subscribers.
    last_published: Option<T>,
    notify_pending: bool,
    force_pending: bool,
    /// Bumped by every delivery; a delivery stops once it is superseded.
    delivery: u64,
    version: u64,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    next_subscription: u64,
    disposed: bool,
}

impl<T> StateInner<T> {
    fn take_registrations(&mut self) -> Registrations {
        Registrations {
            window: self.window.clone(),
            owner: self.owner,
            owner_hook: self.owner_hook.take(),
            pre_update: self.pre_update.take(),
            target: self.target.take(),
        }
    }

    fn push_subscriber(&mut self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        id
    }
}

impl<T> Drop for StateInner<T> {
    fn drop(&mut self) {
        if !self.disposed {
            self.take_registrations().release();
        }
    }
}

/// A prioritized, reactive value bound to an owner entity.
pub struct State<T> {
    inner: Rc<RefCell<StateInner<T>>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("State")
            .field("id", &inner.id)
            .field("label", &inner.label)
            .field("cached", &inner.cached)
            .field("version", &inner.version)
            .field("contributors", &inner.contributors.len())
            .field("manual", &inner.manual)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

fn resolve_value<T: Clone>(
    active: &[Contributor<T>],
    resolver: &dyn Resolver<T>,
    processor: Option<&Processor<T>>,
) -> Result<T> {
    let refs: Vec<&Contributor<T>> = active.iter().collect();
    let winner = resolver
        .resolve(&refs)
        .ok_or_else(|| StateError::invalid("no active contributors to resolve"))?;
    let value = winner.evaluate();
    Ok(match processor {
        Some(process) => process(value),
        None => value,
    })
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Configures and creates a [`State`].
pub struct StateBuilder<T> {
    default: Provider<T>,
    manual: bool,
    ignore_default: Option<bool>,
    resolver: Option<Rc<dyn Resolver<T>>>,
    processor: Option<Processor<T>>,
    subscriber: Option<Rc<dyn Fn(&T)>>,
    label: Option<&'static str>,
}

impl<T: Clone + PartialEq + 'static> StateBuilder<T> {
    /// Start from a constant default value.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self::from_provider(Provider::Static(default))
    }

    /// Start from a default computed on every pass.
    #[must_use]
    pub fn responsive(f: impl Fn() -> T + 'static) -> Self {
        Self::from_provider(Provider::computed(f))
    }

    #[must_use]
    pub fn from_provider(default: Provider<T>) -> Self {
        Self {
            default,
            manual: false,
            ignore_default: None,
            resolver: None,
            processor: None,
            subscriber: None,
            label: None,
        }
    }

    /// Exclude the container from per-frame evaluation; it then changes
    /// only through mutations and [`State::reevaluate`].
    #[must_use]
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Override the window's default-exclusion setting for this container.
    #[must_use]
    pub fn ignore_default_if_others_exist(mut self, ignore: bool) -> Self {
        self.ignore_default = Some(ignore);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver<T> + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    #[must_use]
    pub fn processor(mut self, processor: Processor<T>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Initial change callback.
    #[must_use]
    pub fn subscriber(mut self, f: impl Fn(&T) + 'static) -> Self {
        self.subscriber = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Create the container, owned by `owner`, hosted by `window`.
    ///
    /// The initial value is resolved immediately and cached without
    /// notifying anyone.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if `owner` is not live in `window`.
    pub fn build(self, window: &Window, owner: EntityId) -> Result<State<T>> {
        if !window.is_alive(owner) {
            return Err(StateError::context(format!(
                "owner entity {owner:?} is not live in this window"
            )));
        }

        let id = StateId(window.next_state_id());
        let ignore_default = self
            .ignore_default
            .unwrap_or(window.config().ignore_default_if_others_exist);
        let contributors = ContributorSet::with_default(self.default);
        let resolver = self
            .resolver
            .unwrap_or_else(|| Rc::new(HighestPriorityWins) as Rc<dyn Resolver<T>>);
        let initial = resolve_value(
            &contributors.active(ignore_default),
            resolver.as_ref(),
            self.processor.as_ref(),
        )?;

        let state = State {
            inner: Rc::new(RefCell::new(StateInner {
                id,
                label: self.label,
                window: window.downgrade(),
                owner,
                owner_hook: None,
                pre_update: None,
                target: Some(window.register_target()),
                policy: window.config().notify_policy,
                manual: self.manual,
                ignore_default,
                contributors,
                resolver: Some(resolver),
                processor: self.processor,
                cached: Some(initial.clone()),
                last_published: Some(initial),
                notify_pending: false,
                force_pending: false,
                delivery: 0,
                version: 0,
                subscribers: Vec::new(),
                next_subscription: 0,
                disposed: false,
            })),
        };

        if let Some(callback) = self.subscriber {
            state
                .inner
                .borrow_mut()
                .push_subscriber(Subscriber::Callback(callback));
        }

        let weak = Rc::downgrade(&state.inner);
        let hook = window.on_disposed(owner, move |_| {
            if let Some(inner) = weak.upgrade() {
                State { inner }.dispose();
            }
        })?;
        state.inner.borrow_mut().owner_hook = Some(hook);

        if !self.manual {
            let weak = Rc::downgrade(&state.inner);
            let pre_update = window.register_pre_update(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let state = State { inner };
                match state.reevaluate(false) {
                    Ok(_) | Err(StateError::Disposed) => {}
                    Err(err) => {
                        let id = state.id().raw();
                        tracing::error!(message = "state.tick.failed", state_id = id, %err);
                        panic!("state {id} failed to re-evaluate: {err}");
                    }
                }
            });
            state.inner.borrow_mut().pre_update = Some(pre_update);
        }

        tracing::debug!(
            message = "state.create",
            state_id = id.raw(),
            label = self.label.unwrap_or(""),
            owner = ?owner,
            manual = self.manual
        );
        Ok(state)
    }

    /// Like [`build`](Self::build), from a weak window handle.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if the window is gone or `owner` is
    /// not live in it.
    pub fn build_in(self, window: &WeakWindow, owner: EntityId) -> Result<State<T>> {
        let window = window.upgrade()?;
        self.build(&window, owner)
    }
}

impl<T: Clone + PartialEq + 'static> State<T> {
    /// Automatic container with a constant default.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if `owner` is not live in `window`.
    pub fn new(window: &Window, owner: EntityId, default: T) -> Result<Self> {
        StateBuilder::new(default).build(window, owner)
    }

    /// Automatic container whose default is computed on every pass.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if `owner` is not live in `window`.
    pub fn responsive(
        window: &Window,
        owner: EntityId,
        default: impl Fn() -> T + 'static,
    ) -> Result<Self> {
        StateBuilder::responsive(default).build(window, owner)
    }

    #[must_use]
    pub fn builder(default: T) -> StateBuilder<T> {
        StateBuilder::new(default)
    }
}

// ---------------------------------------------------------------------------
// Contributors and strategy
// ---------------------------------------------------------------------------

impl<T: Clone + PartialEq + 'static> State<T> {
    fn live_mut(&self) -> Result<RefMut<'_, StateInner<T>>> {
        let inner = self.inner.borrow_mut();
        if inner.disposed {
            return Err(StateError::Disposed);
        }
        Ok(inner)
    }

    /// Install `provider` at `priority`, replacing any contributor already
    /// there, then run a resolution pass.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal; [`StateError::Context`] if a
    /// deferred notification cannot be scheduled because the window is gone.
    pub fn add_or_replace(&self, priority: u32, provider: Provider<T>) -> Result<()> {
        let replaced = {
            let mut inner = self.live_mut()?;
            inner
                .contributors
                .insert(Contributor::new(stored_priority(priority), provider))
        };
        drop(replaced);
        self.run_pass(false).map(|_| ())
    }

    /// Install a constant at `priority`.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_static(&self, value: T, priority: u32) -> Result<()> {
        self.add_or_replace(priority, Provider::Static(value))
    }

    /// Install a function evaluated on every pass at `priority`.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_responsive(&self, f: impl Fn() -> T + 'static, priority: u32) -> Result<()> {
        self.add_or_replace(priority, Provider::computed(f))
    }

    /// Set the base value: a constant at caller priority 0. The default
    /// contributor is left in place as the fallback.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_value(&self, value: T) -> Result<()> {
        self.set_static(value, 0)
    }

    /// Set the base value to a function evaluated on every pass.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_value_with(&self, f: impl Fn() -> T + 'static) -> Result<()> {
        self.set_responsive(f, 0)
    }

    /// Remove the contributor installed at `priority`.
    ///
    /// Returns whether one was removed. A missing priority is a no-op, not
    /// an error; the resolution pass runs only after a removal.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn dissolve_priority(&self, priority: u32) -> Result<bool> {
        let removed = self
            .live_mut()?
            .contributors
            .remove(stored_priority(priority));
        let Some(removed) = removed else {
            return Ok(false);
        };
        drop(removed);
        self.run_pass(false)?;
        Ok(true)
    }

    /// Replace the resolver and run a resolution pass.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_resolver(&self, resolver: impl Resolver<T> + 'static) -> Result<()> {
        let resolver: Rc<dyn Resolver<T>> = Rc::new(resolver);
        let name = resolver.name();
        let previous = {
            let mut inner = self.live_mut()?;
            tracing::debug!(
                message = "state.resolver",
                state_id = inner.id.raw(),
                resolver = name
            );
            inner.resolver.replace(resolver)
        };
        drop(previous);
        self.run_pass(false).map(|_| ())
    }

    /// Replace the processor. Takes effect on the next resolution pass.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    pub fn set_processor(&self, processor: Processor<T>) -> Result<()> {
        let previous = self.live_mut()?.processor.replace(processor);
        drop(previous);
        Ok(())
    }

    /// Change the default-exclusion flag and run a resolution pass.
    ///
    /// # Errors
    ///
    /// See [`add_or_replace`](Self::add_or_replace).
    pub fn set_ignore_default(&self, ignore: bool) -> Result<()> {
        self.live_mut()?.ignore_default = ignore;
        self.run_pass(false).map(|_| ())
    }

    /// Resolve now. Returns whether the cached value changed.
    ///
    /// With `force`, subscribers are notified even if it did not.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal; [`StateError::InvalidState`]
    /// if the resolver selects nothing; [`StateError::Context`] if a deferred
    /// notification cannot be scheduled.
    pub fn reevaluate(&self, force: bool) -> Result<bool> {
        self.run_pass(force)
    }

    fn run_pass(&self, force: bool) -> Result<bool> {
        let (id, active, resolver, processor) = {
            let inner = self.inner.borrow();
            if inner.disposed {
                return Err(StateError::Disposed);
            }
            let resolver = inner
                .resolver
                .clone()
                .ok_or_else(|| StateError::invalid("no resolver installed"))?;
            (
                inner.id,
                inner.contributors.active(inner.ignore_default),
                resolver,
                inner.processor.clone(),
            )
        };

        let value = resolve_value(&active, resolver.as_ref(), processor.as_ref())?;

        let (changed, version) = {
            let mut inner = self.inner.borrow_mut();
            // A provider may have disposed us mid-pass.
            if inner.disposed {
                return Err(StateError::Disposed);
            }
            let changed = inner.cached.as_ref() != Some(&value);
            if changed {
                inner.cached = Some(value);
                inner.version += 1;
            }
            (changed, inner.version)
        };

        tracing::trace!(
            message = "state.resolve",
            state_id = id.raw(),
            contributors = active.len(),
            resolver = resolver.name(),
            changed,
            force,
            version
        );

        if changed || force {
            self.publish(force)?;
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

impl<T: Clone + PartialEq + 'static> State<T> {
    fn publish(&self, force: bool) -> Result<()> {
        let policy = self.inner.borrow().policy;
        match policy {
            NotifyPolicy::Immediate => {
                self.deliver(force);
                Ok(())
            }
            NotifyPolicy::Deferred => self.schedule_delivery(force),
        }
    }

    fn schedule_delivery(&self, force: bool) -> Result<()> {
        let (window, target) = {
            let mut inner = self.inner.borrow_mut();
            inner.force_pending |= force;
            if std::mem::replace(&mut inner.notify_pending, true) {
                // Coalesced into the delivery already queued.
                return Ok(());
            }
            (inner.window.clone(), inner.target)
        };

        let window = match window.upgrade() {
            Ok(window) => window,
            Err(err) => {
                self.inner.borrow_mut().notify_pending = false;
                return Err(err);
            }
        };
        let Some(target) = target else {
            self.inner.borrow_mut().notify_pending = false;
            return Err(StateError::Disposed);
        };

        let weak = Rc::downgrade(&self.inner);
        let posted = window.defer_to(target, move || {
            if let Some(inner) = weak.upgrade() {
                State { inner }.deliver_pending();
            }
        });
        if !posted {
            self.inner.borrow_mut().notify_pending = false;
            return Err(StateError::context("notification target already retired"));
        }
        Ok(())
    }

    fn deliver_pending(&self) {
        let force = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.notify_pending = false;
            std::mem::take(&mut inner.force_pending)
        };
        self.deliver(force);
    }

    /// Hand the cached value to every live subscriber, unless it equals the
    /// last value handed out and `force` is off.
    fn deliver(&self, force: bool) {
        let (id, generation, value, subscribers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            let Some(value) = inner.cached.clone() else {
                return;
            };
            if !force && inner.last_published.as_ref() == Some(&value) {
                return;
            }
            inner.last_published = Some(value.clone());
            inner.delivery += 1;
            inner.subscribers.retain(|(_, s)| s.is_live());
            let subscribers: Vec<Subscriber<T>> =
                inner.subscribers.iter().map(|(_, s)| s.clone()).collect();
            (inner.id, inner.delivery, value, subscribers)
        };

        tracing::trace!(
            message = "state.notify",
            state_id = id.raw(),
            subscribers = subscribers.len(),
            force
        );
        for subscriber in &subscribers {
            {
                // A subscriber that changed this container has already
                // triggered a newer delivery; the rest must not see `value`.
                let inner = self.inner.borrow();
                if inner.disposed || inner.delivery != generation {
                    break;
                }
            }
            subscriber.notify(&value);
        }
    }

    /// Register a change callback.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Result<SubscriptionId> {
        Ok(self
            .live_mut()?
            .push_subscriber(Subscriber::Callback(Rc::new(f))))
    }

    /// Register a listener object. The container keeps only a weak
    /// reference to it.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    pub fn subscribe_listener<L: StateListener<T> + 'static>(
        &self,
        listener: &Rc<L>,
    ) -> Result<SubscriptionId> {
        let listener: Rc<dyn StateListener<T>> = listener.clone();
        Ok(self
            .live_mut()?
            .push_subscriber(Subscriber::Listener(Rc::downgrade(&listener))))
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() < before
    }

    /// Remove every subscription of `listener`. Returns `false` if there was
    /// none.
    pub fn unsubscribe_listener<L: StateListener<T> + 'static>(&self, listener: &Rc<L>) -> bool {
        let listener: Rc<dyn StateListener<T>> = listener.clone();
        let target = Rc::downgrade(&listener);
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(_, s)| match s {
            Subscriber::Listener(w) => !Weak::ptr_eq(w, &target),
            Subscriber::Callback(_) => true,
        });
        inner.subscribers.len() < before
    }

    /// Number of registered subscribers, including listener objects that
    /// have been dropped but not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

impl<T: Clone + PartialEq + 'static> State<T> {
    /// Last resolved, processed value. Never forces a resolution pass.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    pub fn cached_value(&self) -> Result<T> {
        self.with_cached(T::clone)
    }

    /// Access the cached value by reference.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this container (re-entrant borrow).
    pub fn with_cached<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let inner = self.inner.borrow();
        if inner.disposed {
            return Err(StateError::Disposed);
        }
        inner
            .cached
            .as_ref()
            .map(f)
            .ok_or_else(|| StateError::invalid("no cached value"))
    }

    /// A provider that reads this container's cached value, for feeding one
    /// container into another. After this container is disposed, the
    /// provider keeps returning the last value it observed.
    ///
    /// # Errors
    ///
    /// [`StateError::Disposed`] after disposal.
    pub fn as_provider(&self) -> Result<Provider<T>> {
        let last = RefCell::new(self.cached_value()?);
        let weak = Rc::downgrade(&self.inner);
        Ok(Provider::computed(move || {
            if let Some(inner) = weak.upgrade()
                && let Ok(inner) = inner.try_borrow()
                && let Some(value) = inner.cached.as_ref()
            {
                *last.borrow_mut() = value.clone();
            }
            last.borrow().clone()
        }))
    }

    /// Increments once per effective change of the cached value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    #[must_use]
    pub fn id(&self) -> StateId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn label(&self) -> Option<&'static str> {
        self.inner.borrow().label
    }

    #[must_use]
    pub fn owner(&self) -> EntityId {
        self.inner.borrow().owner
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.inner.borrow().manual
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Number of contributors, default included (0 after disposal).
    #[must_use]
    pub fn contributor_count(&self) -> usize {
        self.inner.borrow().contributors.len()
    }

    /// Whether a contributor is installed at caller priority `priority`.
    #[must_use]
    pub fn has_priority(&self, priority: u32) -> bool {
        self.inner
            .borrow()
            .contributors
            .contains(stored_priority(priority))
    }

    /// Name of the installed resolver (`None` after disposal).
    #[must_use]
    pub fn resolver_name(&self) -> Option<&'static str> {
        self.inner.borrow().resolver.as_ref().map(|r| r.name())
    }

    /// The pre-update registration, if the container is automatic and alive.
    #[must_use]
    pub fn pre_update_id(&self) -> Option<PreUpdateId> {
        self.inner.borrow().pre_update
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &State<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

impl<T> State<T> {
    /// Deregister from the window, detach from the owner, and drop all
    /// contributors, strategy, and subscribers. Idempotent.
    ///
    /// A notification already queued for this container is dropped.
    pub fn dispose(&self) {
        let (id, registrations, contributors, subscribers, resolver, processor) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.cached = None;
            inner.last_published = None;
            inner.notify_pending = false;
            inner.force_pending = false;
            (
                inner.id,
                inner.take_registrations(),
                inner.contributors.take_all(),
                std::mem::take(&mut inner.subscribers),
                inner.resolver.take(),
                inner.processor.take(),
            )
        };
        registrations.release();
        tracing::debug!(
            message = "state.dispose",
            state_id = id.raw(),
            contributors = contributors.len(),
            subscribers = subscribers.len()
        );
        // User closures are dropped with no borrow held.
        drop((contributors, subscribers, resolver, processor));
    }
}
