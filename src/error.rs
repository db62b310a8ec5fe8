//! Error types for the game status client.

use thiserror::Error;

use crate::state::StatusState;

/// Failures reported by a [`StatusRecordStore`](crate::store::StatusRecordStore).
///
/// A missing record is never an error; stores report it as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The remote service or the network could not serve the request.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// The identity lacks rights to the record.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl StoreError {
    /// Returns `true` if repeating the same request may succeed.
    ///
    /// [`StoreError::Unauthorized`] stays non-retryable until the user
    /// signs in again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::PersistenceUnavailable(_))
    }
}

/// Errors that can occur when using the game status client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameStatusError {
    /// The record store rejected or failed a request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation needs an active identity but nobody is signed in.
    #[error("no identity is signed in")]
    NotSignedIn,

    /// The active identity is no longer the one the view was loaded for.
    #[error("active identity changed since the view was loaded")]
    IdentityChanged,

    /// The action is not allowed from the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// State the machine was in when the action arrived.
        state: StatusState,
        /// Name of the rejected action.
        action: &'static str,
    },

    /// The controller loop has stopped.
    #[error("controller is not running")]
    NotRunning,

    /// A wire status code outside `0..=2`.
    #[error("invalid status code {0}")]
    InvalidStatusCode(u8),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A specialized [`Result`] type for game status client operations.
pub type Result<T> = std::result::Result<T, GameStatusError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::GameStatus;

    #[test]
    fn only_persistence_failures_are_retryable() {
        assert!(StoreError::PersistenceUnavailable("timeout".into()).is_retryable());
        assert!(!StoreError::Unauthorized("forbidden".into()).is_retryable());
    }

    #[test]
    fn store_errors_display_transparently() {
        let err = GameStatusError::from(StoreError::Unauthorized("token expired".into()));
        assert_eq!(err.to_string(), "unauthorized: token expired");
    }

    #[test]
    fn invalid_transition_names_state_and_action() {
        let err = GameStatusError::InvalidTransition {
            state: StatusState::Tracked(GameStatus::Want),
            action: "add",
        };
        assert_eq!(err.to_string(), "cannot add while tracked as Want");
    }
}
