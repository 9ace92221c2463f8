#![forbid(unsafe_code)]

//! Runtime for Kestrel reactive state.
//!
//! The [`Window`] is the explicit context every container lives in: it hosts
//! owner entities, the per-frame [`FrameScheduler`](scheduler::FrameScheduler),
//! and the deferred-task [`Dispatcher`](dispatcher::Dispatcher). The
//! [`reactive`] module builds prioritized [`State`] containers on top.
//!
//! # Example
//!
//! ```
//! use kestrel_runtime::{State, Window};
//!
//! let window = Window::default();
//! let button = window.spawn_entity("button");
//! let opacity = State::new(&window, button, 1.0_f32).unwrap();
//!
//! opacity.set_static(0.5, 10).unwrap();
//! assert_eq!(opacity.cached_value().unwrap(), 0.5);
//!
//! opacity.dissolve_priority(10).unwrap();
//! assert_eq!(opacity.cached_value().unwrap(), 1.0);
//!
//! window.tick();
//! ```

pub mod config;
pub mod dispatcher;
pub mod reactive;
pub mod scheduler;
pub mod window;

pub use config::{NotifyPolicy, WindowConfig};
pub use dispatcher::{Dispatcher, TargetId};
pub use reactive::{
    Contributor, HighestPriorityWins, LargestWins, Processor, Provider, Resolver, SmallestWins,
    State, StateBuilder, StateId, StateListener, SubscriptionId,
};
pub use scheduler::{FrameScheduler, PreUpdateId};
pub use window::{TickStats, WeakWindow, Window};
