//! Events emitted by a [`GameStatusController`](crate::GameStatusController).

use crate::error::GameStatusError;
use crate::state::StatusState;

/// Something the view should react to.
///
/// `StateChanged` carries every visible transition, including optimistic
/// ones and rollbacks. The other variants carry the errors a view surfaces:
/// an error affordance for `LoadFailed`, a dismissible alert for
/// `MutationFailed` and `ActionRejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The visible state changed.
    StateChanged { state: StatusState },

    /// The fetch failed; the view is in [`StatusState::LoadError`] and
    /// offers a retry.
    LoadFailed { error: GameStatusError },

    /// A mutation failed.
    ///
    /// `restored` is the state the view rolled back to, or `None` when a
    /// newer local change supersedes the failed one and nothing moved.
    MutationFailed {
        error: GameStatusError,
        restored: Option<StatusState>,
    },

    /// A user action was refused without touching the remote store.
    ActionRejected { error: GameStatusError },

    /// The signed-in identity changed; the view dropped everything tied to
    /// the previous identity and is back to [`StatusState::Unknown`].
    SessionInvalidated,
}
