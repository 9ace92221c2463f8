#![forbid(unsafe_code)]

//! Kestrel public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use kestrel_core::{EntityId, Result, StateError};
pub use kestrel_runtime::{
    NotifyPolicy, State, StateBuilder, TickStats, WeakWindow, Window, WindowConfig,
};

#[cfg(feature = "log-init")]
pub use kestrel_core::logging::init_from_env as init_logging;

pub mod prelude {
    pub use kestrel_core as core;
    pub use kestrel_runtime as runtime;

    pub use kestrel_core::{EntityId, StateError};
    pub use kestrel_runtime::reactive::{
        HighestPriorityWins, LargestWins, Provider, Resolver, SmallestWins, State, StateBuilder,
        StateListener,
    };
    pub use kestrel_runtime::{NotifyPolicy, Window, WindowConfig};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_covers_common_use() {
        let window = Window::new(WindowConfig::default());
        let owner = window.spawn_entity("slider");
        let value = State::builder(0.0_f64)
            .resolver(LargestWins)
            .build(&window, owner)
            .unwrap();
        value.set_static(0.25, 1).unwrap();
        value.set_static(0.75, 2).unwrap();
        assert_eq!(value.cached_value().unwrap(), 0.75);

        window.dispose_entity(owner);
        assert_eq!(value.cached_value(), Err(StateError::Disposed));
    }
}
