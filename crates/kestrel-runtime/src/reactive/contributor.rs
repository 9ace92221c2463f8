#![forbid(unsafe_code)]

//! Contributors: prioritized value sources for a [`State`](super::State).
//!
//! A [`Contributor`] pairs a stored priority with a [`Provider`]. Callers
//! never see stored priorities directly: every caller priority `p` is stored
//! at `p + 1` (saturating at `u32::MAX`), which reserves stored priority 0
//! for the default contributor a container installs at construction.
//!
//! # Invariants
//!
//! 1. A [`ContributorSet`] holds at most one contributor per stored priority.
//! 2. Inserting at an occupied priority replaces the occupant in place of a
//!    duplicate; the replacement moves to the end of insertion order.
//! 3. The default contributor can only be removed by `ContributorSet::take_all`,
//!    which the container calls on disposal.

use std::rc::Rc;

/// Stored priority of the default contributor.
pub const DEFAULT_PRIORITY: u32 = 0;

/// Map a caller priority to its stored priority.
#[must_use]
pub const fn stored_priority(priority: u32) -> u32 {
    priority.saturating_add(1)
}

/// How a contributor produces its value.
pub enum Provider<T> {
    /// A constant.
    Static(T),
    /// A function evaluated on every resolution pass.
    Computed(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Provider<T> {
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self::Static(value)
    }

    #[must_use]
    pub fn computed(f: impl Fn() -> T + 'static) -> Self {
        Self::Computed(Rc::new(f))
    }

    /// Produce the current value.
    #[must_use]
    pub fn evaluate(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }
}

impl<T: Clone> Clone for Provider<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Computed(f) => Self::Computed(Rc::clone(f)),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T> From<T> for Provider<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

/// One prioritized value source.
#[derive(Clone, Debug)]
pub struct Contributor<T> {
    priority: u32,
    provider: Provider<T>,
}

impl<T> Contributor<T> {
    pub(crate) fn new(priority: u32, provider: Provider<T>) -> Self {
        Self { priority, provider }
    }

    /// Stored priority (caller priority + 1; 0 for the default).
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.priority == DEFAULT_PRIORITY
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.provider, Provider::Static(_))
    }

    #[must_use]
    pub fn provider(&self) -> &Provider<T> {
        &self.provider
    }
}

impl<T: Clone> Contributor<T> {
    #[must_use]
    pub fn evaluate(&self) -> T {
        self.provider.evaluate()
    }
}

/// Insertion-ordered contributors with unique stored priorities.
#[derive(Clone, Debug)]
pub(crate) struct ContributorSet<T> {
    entries: Vec<Contributor<T>>,
}

impl<T> ContributorSet<T> {
    pub(crate) fn with_default(provider: Provider<T>) -> Self {
        Self {
            entries: vec![Contributor::new(DEFAULT_PRIORITY, provider)],
        }
    }

    /// Insert, replacing any contributor at the same stored priority.
    pub(crate) fn insert(&mut self, contributor: Contributor<T>) -> Option<Contributor<T>> {
        let replaced = self.take(contributor.priority);
        self.entries.push(contributor);
        replaced
    }

    /// Remove the contributor at a stored priority. The default is never
    /// removed this way.
    pub(crate) fn remove(&mut self, priority: u32) -> Option<Contributor<T>> {
        if priority == DEFAULT_PRIORITY {
            return None;
        }
        self.take(priority)
    }

    fn take(&mut self, priority: u32) -> Option<Contributor<T>> {
        let idx = self.entries.iter().position(|c| c.priority == priority)?;
        Some(self.entries.remove(idx))
    }

    pub(crate) fn contains(&self, priority: u32) -> bool {
        self.entries.iter().any(|c| c.priority == priority)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove everything, default included.
    pub(crate) fn take_all(&mut self) -> Vec<Contributor<T>> {
        std::mem::take(&mut self.entries)
    }
}

impl<T: Clone> ContributorSet<T> {
    /// Contributors taking part in resolution, in insertion order.
    ///
    /// With more than one contributor and `ignore_default` set, the default
    /// is left out.
    pub(crate) fn active(&self, ignore_default: bool) -> Vec<Contributor<T>> {
        let skip_default = ignore_default && self.entries.len() > 1;
        self.entries
            .iter()
            .filter(|c| !(skip_default && c.is_default()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn priorities(set: &ContributorSet<i32>, ignore_default: bool) -> Vec<u32> {
        set.active(ignore_default)
            .iter()
            .map(Contributor::priority)
            .collect()
    }

    #[test]
    fn stored_priority_shifts_and_saturates() {
        assert_eq!(stored_priority(0), 1);
        assert_eq!(stored_priority(41), 42);
        assert_eq!(stored_priority(u32::MAX - 1), u32::MAX);
        assert_eq!(stored_priority(u32::MAX), u32::MAX);
    }

    #[test]
    fn computed_provider_reevaluates() {
        let source = Rc::new(Cell::new(1));
        let s = Rc::clone(&source);
        let provider = Provider::computed(move || s.get() * 10);
        assert!(!provider.is_static());
        assert_eq!(provider.evaluate(), 10);
        source.set(4);
        assert_eq!(provider.evaluate(), 40);
    }

    #[test]
    fn insert_replaces_same_priority() {
        let mut set = ContributorSet::with_default(Provider::constant(0));
        set.insert(Contributor::new(stored_priority(3), Provider::constant(30)));
        let replaced = set.insert(Contributor::new(stored_priority(3), Provider::constant(31)));

        assert_eq!(replaced.map(|c| c.evaluate()), Some(30));
        assert_eq!(set.len(), 2);
        let active = set.active(true);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].evaluate(), 31);
    }

    #[test]
    fn default_cannot_be_removed() {
        let mut set = ContributorSet::with_default(Provider::constant(0));
        assert!(set.remove(DEFAULT_PRIORITY).is_none());
        assert!(set.contains(DEFAULT_PRIORITY));
    }

    #[test]
    fn default_excluded_only_when_others_exist() {
        let mut set = ContributorSet::with_default(Provider::constant(0));
        assert_eq!(priorities(&set, true), vec![0]);

        set.insert(Contributor::new(stored_priority(0), Provider::constant(1)));
        assert_eq!(priorities(&set, true), vec![1]);
        assert_eq!(priorities(&set, false), vec![0, 1]);

        set.remove(stored_priority(0));
        assert_eq!(priorities(&set, true), vec![0]);
    }

    #[test]
    fn take_all_empties_default_included() {
        let mut set = ContributorSet::with_default(Provider::constant(0));
        set.insert(Contributor::new(stored_priority(2), Provider::constant(2)));
        assert_eq!(set.take_all().len(), 2);
        assert_eq!(set.len(), 0);
        assert!(set.active(true).is_empty());
    }

    #[test]
    fn remove_missing_is_none() {
        let mut set = ContributorSet::with_default(Provider::constant(0));
        assert!(set.remove(stored_priority(9)).is_none());
        assert_eq!(set.len(), 1);
    }
}
