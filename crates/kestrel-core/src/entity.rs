#![forbid(unsafe_code)]

//! Owner entities and their disposal signal.
//!
//! UI entities that own reactive containers live in an [`EntityRegistry`]
//! arena and are addressed by generation-checked [`EntityId`]s. A container
//! keeps only the id, never the entity itself, so it cannot extend the
//! owner's lifetime. Disposing an entity bumps its slot generation: every
//! outstanding id for it becomes stale at once, which makes disposal
//! observable deterministically through [`EntityRegistry::is_alive`].
//!
//! # Disposal signal
//!
//! Each entity raises exactly one "disposed" signal. Interested parties
//! attach a [`DisposeHook`] with [`EntityRegistry::add_hook`] and detach it
//! with [`EntityRegistry::remove_hook`].
//!
//! The registry never runs hooks itself. [`EntityRegistry::retire`] removes
//! the entity and hands its hooks back in registration order, so the caller
//! can release any borrow of the registry before running them. Hooks are
//! free to call back into the registry, including removing their own
//! registration (a no-op by then, since the id is already stale).
//!
//! # Invariants
//!
//! 1. A retired id never becomes live again, even if its slot is reused.
//! 2. Hooks are returned in the order they were added.
//! 3. Hooks can only be attached to live entities.

use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, StateError};

new_key_type! {
    /// Generation-checked handle to an owner entity.
    pub struct EntityId;
}

/// Handle to one registered disposal hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl HookId {
    /// Raw counter value, unique within one registry.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Callback run once when its entity is disposed.
pub type DisposeHook = Box<dyn FnOnce(EntityId)>;

struct EntitySlot {
    label: String,
    hooks: Vec<(HookId, DisposeHook)>,
}

impl std::fmt::Debug for EntitySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySlot")
            .field("label", &self.label)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Arena of owner entities.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: SlotMap<EntityId, EntitySlot>,
    next_hook: u64,
    retired_total: u64,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a live entity.
    pub fn spawn(&mut self, label: impl Into<String>) -> EntityId {
        let label = label.into();
        let id = self.slots.insert(EntitySlot {
            label,
            hooks: Vec::new(),
        });
        tracing::trace!(message = "entity.spawn", entity = ?id);
        id
    }

    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn label(&self, id: EntityId) -> Option<&str> {
        self.slots.get(id).map(|slot| slot.label.as_str())
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of entities retired over the registry's lifetime.
    #[must_use]
    pub fn retired_total(&self) -> u64 {
        self.retired_total
    }

    /// Snapshot of all live ids.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots.keys().collect()
    }

    /// Attach a disposal hook to a live entity.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if `id` is stale or was never issued
    /// by this registry.
    pub fn add_hook(&mut self, id: EntityId, hook: DisposeHook) -> Result<HookId> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Err(StateError::context(format!(
                "owner entity {id:?} is not live"
            )));
        };
        let hook_id = HookId(self.next_hook);
        self.next_hook += 1;
        slot.hooks.push((hook_id, hook));
        Ok(hook_id)
    }

    /// Detach a hook. Returns `false` if the entity or the hook is gone.
    pub fn remove_hook(&mut self, id: EntityId, hook: HookId) -> bool {
        self.take_hook(id, hook).is_some()
    }

    /// Detach a hook and return it without running it.
    pub fn take_hook(&mut self, id: EntityId, hook: HookId) -> Option<DisposeHook> {
        let slot = self.slots.get_mut(id)?;
        let idx = slot.hooks.iter().position(|(h, _)| *h == hook)?;
        Some(slot.hooks.remove(idx).1)
    }

    /// Number of hooks attached to `id` (0 for stale ids).
    #[must_use]
    pub fn hook_count(&self, id: EntityId) -> usize {
        self.slots.get(id).map_or(0, |slot| slot.hooks.len())
    }

    /// Remove a live entity and return its hooks in registration order.
    ///
    /// Returns `None` if the entity was already retired; retiring twice is
    /// not an error.
    pub fn retire(&mut self, id: EntityId) -> Option<Vec<DisposeHook>> {
        let slot = self.slots.remove(id)?;
        self.retired_total += 1;
        tracing::trace!(
            message = "entity.retire",
            entity = ?id,
            label = %slot.label,
            hooks = slot.hooks.len()
        );
        Some(slot.hooks.into_iter().map(|(_, hook)| hook).collect())
    }
}
