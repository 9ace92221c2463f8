#![forbid(unsafe_code)]

//! Resolver strategies: pick the winning contributor from the active set.
//!
//! | Resolver | Winner | Ties |
//! |---|---|---|
//! | [`HighestPriorityWins`] (default) | greatest stored priority | last inserted |
//! | [`SmallestWins`] | minimum evaluated value | first inserted |
//! | [`LargestWins`] | maximum evaluated value | first inserted |
//!
//! The extremum resolvers ignore priority entirely. They suit properties
//! where several simultaneous requests must combine monotonically, such as a
//! blur radius inherited down a chain where the largest request wins.
//!
//! Values that do not compare equal to themselves (float NaN) lose to any
//! ordered value.

use std::cmp::Ordering;

use super::contributor::Contributor;

/// Selection policy over the active contributors of one container.
pub trait Resolver<T> {
    /// Return the winner, or `None` only when `active` is empty.
    fn resolve<'a>(&self, active: &[&'a Contributor<T>]) -> Option<&'a Contributor<T>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Greatest stored priority wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighestPriorityWins;

impl<T: Clone> Resolver<T> for HighestPriorityWins {
    fn resolve<'a>(&self, active: &[&'a Contributor<T>]) -> Option<&'a Contributor<T>> {
        // max_by_key keeps the last of equal maxima.
        active.iter().copied().max_by_key(|c| c.priority())
    }

    fn name(&self) -> &'static str {
        "highest_priority"
    }
}

/// Smallest evaluated value wins, regardless of priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmallestWins;

impl<T: Clone + PartialOrd> Resolver<T> for SmallestWins {
    fn resolve<'a>(&self, active: &[&'a Contributor<T>]) -> Option<&'a Contributor<T>> {
        extremum(active, Ordering::Less)
    }

    fn name(&self) -> &'static str {
        "smallest"
    }
}

/// Largest evaluated value wins, regardless of priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LargestWins;

impl<T: Clone + PartialOrd> Resolver<T> for LargestWins {
    fn resolve<'a>(&self, active: &[&'a Contributor<T>]) -> Option<&'a Contributor<T>> {
        extremum(active, Ordering::Greater)
    }

    fn name(&self) -> &'static str {
        "largest"
    }
}

fn is_ordered<T: PartialOrd>(value: &T) -> bool {
    value.partial_cmp(value).is_some()
}

fn extremum<'a, T: Clone + PartialOrd>(
    active: &[&'a Contributor<T>],
    want: Ordering,
) -> Option<&'a Contributor<T>> {
    let mut best: Option<(&'a Contributor<T>, T)> = None;
    for &candidate in active {
        let value = candidate.evaluate();
        let better = match &best {
            None => true,
            Some((_, current)) => {
                (!is_ordered(current) && is_ordered(&value))
                    || value.partial_cmp(current) == Some(want)
            }
        };
        if better {
            best = Some((candidate, value));
        }
    }
    best.map(|(winner, _)| winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::contributor::{Provider, stored_priority};

    fn contributors(pairs: &[(u32, f64)]) -> Vec<Contributor<f64>> {
        pairs
            .iter()
            .map(|&(p, v)| Contributor::new(stored_priority(p), Provider::constant(v)))
            .collect()
    }

    fn winner<R: Resolver<f64>>(resolver: &R, pairs: &[(u32, f64)]) -> Option<f64> {
        let owned = contributors(pairs);
        let refs: Vec<&Contributor<f64>> = owned.iter().collect();
        resolver.resolve(&refs).map(Contributor::evaluate)
    }

    #[test]
    fn highest_priority_ignores_value() {
        assert_eq!(
            winner(&HighestPriorityWins, &[(1, 9.0), (7, 2.0), (3, 5.0)]),
            Some(2.0)
        );
    }

    #[test]
    fn smallest_ignores_priority() {
        assert_eq!(winner(&SmallestWins, &[(1, 3.0), (5, 1.0)]), Some(1.0));
        assert_eq!(winner(&SmallestWins, &[(5, 1.0), (1, 3.0)]), Some(1.0));
    }

    #[test]
    fn largest_ignores_priority() {
        assert_eq!(winner(&LargestWins, &[(9, 0.5), (0, 4.0), (4, 2.0)]), Some(4.0));
    }

    #[test]
    fn empty_has_no_winner() {
        assert_eq!(winner(&HighestPriorityWins, &[]), None);
        assert_eq!(winner(&SmallestWins, &[]), None);
        assert_eq!(winner(&LargestWins, &[]), None);
    }

    #[test]
    fn extremum_ties_keep_first_inserted() {
        let owned = contributors(&[(2, 1.0), (8, 1.0)]);
        let refs: Vec<&Contributor<f64>> = owned.iter().collect();
        let w = SmallestWins.resolve(&refs).unwrap();
        assert_eq!(w.priority(), stored_priority(2));
    }

    #[test]
    fn nan_loses_to_ordered_values() {
        assert_eq!(winner(&LargestWins, &[(1, f64::NAN), (2, -1.0)]), Some(-1.0));
        assert_eq!(winner(&SmallestWins, &[(1, 5.0), (2, f64::NAN)]), Some(5.0));
        assert!(winner(&SmallestWins, &[(1, f64::NAN)]).unwrap().is_nan());
    }

    #[test]
    fn names() {
        assert_eq!(Resolver::<f64>::name(&HighestPriorityWins), "highest_priority");
        assert_eq!(Resolver::<f64>::name(&SmallestWins), "smallest");
        assert_eq!(Resolver::<f64>::name(&LargestWins), "largest");
    }
}
