use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

/// Failures surfaced by reactive containers and their hosting window.
///
/// Panics raised by user-supplied providers, resolvers, or processors are
/// not represented here; they unwind to the caller of the triggering
/// operation untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No usable window context: the window was dropped, or the owner entity
    /// is not live in it.
    #[error("no valid window context: {reason}")]
    Context { reason: String },

    /// Resolution was attempted with nothing to resolve.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// The container was disposed and can no longer be used.
    #[error("state container has been disposed")]
    Disposed,
}

impl StateError {
    #[must_use]
    pub fn context(reason: impl Into<String>) -> Self {
        Self::Context {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Whether this error means the container is permanently unusable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed | Self::InvalidState { .. })
    }
}
