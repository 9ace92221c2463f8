#![forbid(unsafe_code)]

//! Prioritized reactive values for Kestrel.
//!
//! This module provides the value-resolution primitives widgets bind their
//! properties to:
//!
//! - [`State`]: a shared container whose effective value is resolved from
//!   prioritized [`Contributor`]s, post-processed, cached, and published to
//!   subscribers only when it changes.
//! - [`Resolver`]: the selection policy. [`HighestPriorityWins`] is the
//!   default; [`SmallestWins`] and [`LargestWins`] combine simultaneous
//!   requests by value.
//! - [`Processor`]: a pure transform applied to every resolved value.
//!
//! # Architecture
//!
//! `State<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Automatic containers re-resolve once per frame from the window's
//! pre-update phase; manual containers change only when mutated or
//! explicitly re-evaluated. Under the default
//! [`NotifyPolicy::Deferred`](crate::config::NotifyPolicy) subscribers run
//! from the window's dispatcher, coalesced to one delivery per container per
//! drain.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per effective change of the cached
//!    value.
//! 2. Subscribers are notified in registration order.
//! 3. A resolution pass that yields a value equal to the cached one is
//!    silent unless forced.
//! 4. A disposed container is unreachable from its window.

pub mod contributor;
pub mod processor;
pub mod resolver;
pub mod state;

pub use contributor::{Contributor, Provider};
pub use processor::Processor;
pub use resolver::{HighestPriorityWins, LargestWins, Resolver, SmallestWins};
pub use state::{State, StateBuilder, StateId, StateListener, SubscriptionId};
