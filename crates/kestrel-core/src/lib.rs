#![forbid(unsafe_code)]

//! Core: owner-entity lifecycle, error types, and logging setup.
//!
//! Everything here is single-threaded and free of process-wide state. The
//! [`entity::EntityRegistry`] is owned by a window and handed out by
//! reference; [`error::StateError`] is shared by every reactive container.

pub mod entity;
pub mod error;
pub mod logging;

pub use entity::{DisposeHook, EntityId, EntityRegistry, HookId};
pub use error::{Result, StateError};
