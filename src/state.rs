//! Per-view status state machine.
//!
//! [`StatusMachine`] is synchronous and owns no I/O. User actions return a
//! [`RemoteCall`] describing the request to issue; remote completions are fed
//! back through [`StatusMachine::complete_fetch`] and
//! [`StatusMachine::complete_mutation`], which decide whether the result is
//! applied, rolled back, or discarded.
//!
//! ```text
//!            load                 fetch ok (absent)
//! Unknown ─────────▶ Loading ─────────────────────────▶ Untracked ◀─┐
//!                     │  │         fetch ok (record)                 │ remove
//!                     │  └──────────────────────────────▶ Tracked(s) ─┘
//!          fetch err  ▼                  ▲   add(s) from Untracked/Loading
//!                  LoadError ── retry ──▶ Loading
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::error::{GameStatusError, Result, StoreError};
use crate::protocol::{GameStatus, StatusRecord};

/// Identifier of one remote request issued by a machine.
pub type RequestId = u64;

/// Externally observable state of one game's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    /// Nothing has been loaded yet.
    Unknown,
    /// The initial fetch is outstanding.
    Loading,
    /// No record exists for the pair.
    Untracked,
    /// A record exists with the given status.
    Tracked(GameStatus),
    /// The fetch failed; `retry` re-enters `Loading`.
    LoadError,
}

impl StatusState {
    fn from_remote(status: Option<GameStatus>) -> Self {
        match status {
            Some(status) => StatusState::Tracked(status),
            None => StatusState::Untracked,
        }
    }

    /// The status shown to the user, if the game is tracked.
    pub fn status(&self) -> Option<GameStatus> {
        match self {
            StatusState::Tracked(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Unknown => f.write_str("unknown"),
            StatusState::Loading => f.write_str("loading"),
            StatusState::Untracked => f.write_str("untracked"),
            StatusState::Tracked(status) => write!(f, "tracked as {status}"),
            StatusState::LoadError => f.write_str("load failed"),
        }
    }
}

/// A remote request the caller must issue on behalf of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    /// Read the current record.
    Fetch { request: RequestId },
    /// Create or overwrite the record with `status`.
    Upsert {
        request: RequestId,
        status: GameStatus,
    },
    /// Remove the record.
    Delete { request: RequestId },
}

impl RemoteCall {
    /// The request id the completion must carry.
    pub fn request(&self) -> RequestId {
        match self {
            RemoteCall::Fetch { request }
            | RemoteCall::Upsert { request, .. }
            | RemoteCall::Delete { request } => *request,
        }
    }
}

/// What a completion did to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The visible state changed to the contained value.
    Applied(StatusState),
    /// The remote confirmed a mutation; nothing visible changed.
    Confirmed,
    /// The fetch failed while loading; the machine is now `LoadError`.
    LoadFailed(StoreError),
    /// A mutation failed and the optimistic change was undone.
    RolledBack {
        restored: StatusState,
        error: StoreError,
    },
    /// A mutation failed but a newer local change supersedes it.
    Superseded(StoreError),
    /// The completion belongs to a request the machine no longer tracks,
    /// or the state moved on before it arrived.
    Discarded,
}

#[derive(Debug, Clone, Copy)]
struct PendingMutation {
    request: RequestId,
    /// State to restore if this mutation fails and nothing newer exists.
    previous: StatusState,
    target: Option<GameStatus>,
}

/// What the last resolved fetch said about the remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Remote {
    NotFetched,
    Failed,
    Known(Option<GameStatus>),
}

/// State machine for one `(user, game)` pair.
#[derive(Debug)]
pub struct StatusMachine {
    state: StatusState,
    next_request: RequestId,
    pending_fetch: Option<RequestId>,
    remote: Remote,
    pending: VecDeque<PendingMutation>,
    /// Newest mutation the remote has confirmed.
    last_confirmed: Option<RequestId>,
}

impl StatusMachine {
    /// A machine in [`StatusState::Unknown`].
    pub fn new() -> Self {
        Self {
            state: StatusState::Unknown,
            next_request: 1,
            pending_fetch: None,
            remote: Remote::NotFetched,
            pending: VecDeque::new(),
            last_confirmed: None,
        }
    }

    /// Current visible state.
    pub fn state(&self) -> StatusState {
        self.state
    }

    /// Last status the remote store confirmed, if known.
    ///
    /// `Some(None)` means the remote confirmed there is no record.
    pub fn confirmed(&self) -> Option<Option<GameStatus>> {
        match self.remote {
            Remote::Known(status) => Some(status),
            Remote::NotFetched | Remote::Failed => None,
        }
    }

    /// Number of mutations awaiting a completion.
    pub fn pending_mutations(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if the fetch is outstanding.
    pub fn is_fetching(&self) -> bool {
        self.pending_fetch.is_some()
    }

    // ── User actions ────────────────────────────────────────────────

    /// Begin the initial load. Allowed from `Unknown` only.
    pub fn load(&mut self) -> Result<RemoteCall> {
        self.guard(matches!(self.state, StatusState::Unknown), "load")?;
        Ok(self.begin_fetch())
    }

    /// Re-run a failed load. Allowed from `LoadError` only.
    pub fn retry(&mut self) -> Result<RemoteCall> {
        self.guard(matches!(self.state, StatusState::LoadError), "retry")?;
        Ok(self.begin_fetch())
    }

    /// Add the game to the library with `status`.
    ///
    /// Allowed from `Untracked`, and from `Loading` so a user acting before
    /// the fetch resolves takes precedence over it.
    pub fn add(&mut self, status: GameStatus) -> Result<RemoteCall> {
        self.guard(
            matches!(self.state, StatusState::Untracked | StatusState::Loading),
            "add",
        )?;
        let request = self.push_mutation(Some(status));
        Ok(RemoteCall::Upsert { request, status })
    }

    /// Replace the tracked status with `status`.
    ///
    /// Returns `Ok(None)` without issuing anything when `status` is already
    /// the tracked one.
    pub fn change_status(&mut self, status: GameStatus) -> Result<Option<RemoteCall>> {
        let StatusState::Tracked(current) = self.state else {
            return Err(self.rejected("change status"));
        };
        if current == status {
            debug!(%status, "status unchanged, nothing to persist");
            return Ok(None);
        }
        let request = self.push_mutation(Some(status));
        Ok(Some(RemoteCall::Upsert { request, status }))
    }

    /// Remove the game from the library. Allowed from `Tracked` only.
    pub fn remove(&mut self) -> Result<RemoteCall> {
        self.guard(matches!(self.state, StatusState::Tracked(_)), "remove")?;
        let request = self.push_mutation(None);
        Ok(RemoteCall::Delete { request })
    }

    /// Forget everything and return to `Unknown`.
    ///
    /// Outstanding requests are not cancelled here, but every completion
    /// they produce is discarded.
    pub fn reset(&mut self) {
        self.state = StatusState::Unknown;
        self.pending_fetch = None;
        self.remote = Remote::NotFetched;
        self.pending.clear();
        self.last_confirmed = None;
    }

    // ── Completions ─────────────────────────────────────────────────

    /// Apply the result of a fetch.
    pub fn complete_fetch(
        &mut self,
        request: RequestId,
        result: std::result::Result<Option<StatusRecord>, StoreError>,
    ) -> Outcome {
        if self.pending_fetch != Some(request) {
            return Outcome::Discarded;
        }
        self.pending_fetch = None;

        match result {
            Ok(record) => {
                let status = record.map(|record| record.current_status);
                // A mutation issued after this fetch and already confirmed
                // is newer than anything the fetch saw.
                if !self.last_confirmed.is_some_and(|last| last > request) {
                    self.remote = Remote::Known(status);
                }
                if self.state != StatusState::Loading {
                    debug!(request, "user acted before the fetch resolved; result ignored");
                    return Outcome::Discarded;
                }
                self.state = StatusState::from_remote(status);
                Outcome::Applied(self.state)
            }
            Err(error) => {
                self.remote = Remote::Failed;
                if self.state != StatusState::Loading {
                    return Outcome::Discarded;
                }
                self.state = StatusState::LoadError;
                Outcome::LoadFailed(error)
            }
        }
    }

    /// Apply the result of an upsert or delete.
    ///
    /// Completions may arrive in any order. A failure only rolls back when
    /// no newer mutation is still pending or has been confirmed; otherwise
    /// the newer change owns the visible state.
    pub fn complete_mutation(
        &mut self,
        request: RequestId,
        result: std::result::Result<(), StoreError>,
    ) -> Outcome {
        let Some(index) = self.pending.iter().position(|m| m.request == request) else {
            return Outcome::Discarded;
        };
        let Some(mutation) = self.pending.remove(index) else {
            return Outcome::Discarded;
        };
        let newer_confirmed = self.last_confirmed.is_some_and(|last| last > request);

        match result {
            Ok(()) => {
                if !newer_confirmed {
                    self.remote = Remote::Known(mutation.target);
                    self.last_confirmed = Some(request);
                }
                Outcome::Confirmed
            }
            Err(error) => match self.pending.get_mut(index) {
                // A newer change owns the visible state. Unless something in
                // between was confirmed, hand it this mutation's rollback
                // target so a later failure does not restore a state that
                // was never persisted.
                Some(newer) => {
                    if !newer_confirmed {
                        newer.previous = mutation.previous;
                    }
                    Outcome::Superseded(error)
                }
                None if newer_confirmed => Outcome::Superseded(error),
                None => {
                    let restored = self.resolve_previous(mutation.previous);
                    self.state = restored;
                    Outcome::RolledBack { restored, error }
                }
            },
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn begin_fetch(&mut self) -> RemoteCall {
        let request = self.allocate();
        self.state = StatusState::Loading;
        self.pending_fetch = Some(request);
        RemoteCall::Fetch { request }
    }

    fn push_mutation(&mut self, target: Option<GameStatus>) -> RequestId {
        let request = self.allocate();
        self.pending.push_back(PendingMutation {
            request,
            previous: self.state,
            target,
        });
        self.state = match target {
            Some(status) => StatusState::Tracked(status),
            None => StatusState::Untracked,
        };
        request
    }

    fn allocate(&mut self) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        request
    }

    /// A rollback to `Loading` lands wherever the fetch has got to by now.
    fn resolve_previous(&self, previous: StatusState) -> StatusState {
        if previous != StatusState::Loading || self.pending_fetch.is_some() {
            return previous;
        }
        match self.remote {
            Remote::Known(status) => StatusState::from_remote(status),
            Remote::Failed => StatusState::LoadError,
            Remote::NotFetched => StatusState::Unknown,
        }
    }

    fn guard(&self, allowed: bool, action: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(self.rejected(action))
        }
    }

    fn rejected(&self, action: &'static str) -> GameStatusError {
        GameStatusError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::UserId;

    fn record(status: GameStatus) -> StatusRecord {
        StatusRecord {
            game_id: 1942,
            user_id: UserId::Numeric(1),
            current_status: status,
        }
    }

    fn unavailable() -> StoreError {
        StoreError::PersistenceUnavailable("connection reset".into())
    }

    fn loaded(status: Option<GameStatus>) -> StatusMachine {
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        machine.complete_fetch(fetch.request(), Ok(status.map(record)));
        machine
    }

    #[test]
    fn load_resolves_to_untracked_when_absent() {
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        assert_eq!(machine.state(), StatusState::Loading);
        let outcome = machine.complete_fetch(fetch.request(), Ok(None));
        assert_eq!(outcome, Outcome::Applied(StatusState::Untracked));
        assert_eq!(machine.confirmed(), Some(None));
    }

    #[test]
    fn load_resolves_to_tracked_when_present() {
        let machine = loaded(Some(GameStatus::Want));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Want));
    }

    #[test]
    fn failed_load_can_be_retried() {
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        let outcome = machine.complete_fetch(fetch.request(), Err(unavailable()));
        assert_eq!(outcome, Outcome::LoadFailed(unavailable()));
        assert_eq!(machine.state(), StatusState::LoadError);

        let retry = machine.retry().unwrap();
        assert_ne!(retry.request(), fetch.request());
        machine.complete_fetch(retry.request(), Ok(Some(record(GameStatus::Playing))));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Playing));
    }

    #[test]
    fn guards_reject_out_of_state_actions() {
        let mut machine = StatusMachine::new();
        assert!(matches!(
            machine.add(GameStatus::Want),
            Err(GameStatusError::InvalidTransition { action: "add", .. })
        ));
        assert!(machine.retry().is_err());
        assert!(machine.remove().is_err());

        let mut machine = loaded(None);
        assert!(machine.load().is_err());
        assert!(machine.remove().is_err());
        assert!(machine.change_status(GameStatus::Want).is_err());
        assert_eq!(machine.state(), StatusState::Untracked);

        let mut machine = loaded(Some(GameStatus::Completed));
        assert!(machine.add(GameStatus::Want).is_err());
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Completed));
    }

    #[test]
    fn add_is_optimistic_and_confirmed() {
        let mut machine = loaded(None);
        let call = machine.add(GameStatus::Playing).unwrap();
        assert!(matches!(
            call,
            RemoteCall::Upsert {
                status: GameStatus::Playing,
                ..
            }
        ));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Playing));
        assert_eq!(
            machine.complete_mutation(call.request(), Ok(())),
            Outcome::Confirmed
        );
        assert_eq!(machine.confirmed(), Some(Some(GameStatus::Playing)));
        assert_eq!(machine.pending_mutations(), 0);
    }

    #[test]
    fn failed_add_rolls_back_to_untracked() {
        let mut machine = loaded(None);
        let call = machine.add(GameStatus::Playing).unwrap();
        let outcome = machine.complete_mutation(call.request(), Err(unavailable()));
        assert_eq!(
            outcome,
            Outcome::RolledBack {
                restored: StatusState::Untracked,
                error: unavailable(),
            }
        );
        assert_eq!(machine.state(), StatusState::Untracked);
    }

    #[test]
    fn failed_remove_rolls_back_to_tracked() {
        let mut machine = loaded(Some(GameStatus::Want));
        let call = machine.remove().unwrap();
        assert_eq!(call, RemoteCall::Delete { request: call.request() });
        assert_eq!(machine.state(), StatusState::Untracked);
        machine.complete_mutation(call.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Want));
    }

    #[test]
    fn change_status_replaces_and_rolls_back() {
        let mut machine = loaded(Some(GameStatus::Want));
        let call = machine.change_status(GameStatus::Completed).unwrap().unwrap();
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Completed));
        machine.complete_mutation(
            call.request(),
            Err(StoreError::Unauthorized("expired".into())),
        );
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Want));
    }

    #[test]
    fn change_to_same_status_is_a_no_op() {
        let mut machine = loaded(Some(GameStatus::Playing));
        assert_eq!(machine.change_status(GameStatus::Playing).unwrap(), None);
        assert_eq!(machine.pending_mutations(), 0);
    }

    #[test]
    fn stale_failure_does_not_clobber_newer_change() {
        let mut machine = loaded(None);
        let first = machine.add(GameStatus::Want).unwrap();
        let second = machine.change_status(GameStatus::Playing).unwrap().unwrap();

        let outcome = machine.complete_mutation(first.request(), Err(unavailable()));
        assert_eq!(outcome, Outcome::Superseded(unavailable()));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Playing));

        // The newer change now rolls back past the failed one.
        machine.complete_mutation(second.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::Untracked);
    }

    #[test]
    fn newer_failure_restores_confirmed_older_change() {
        let mut machine = loaded(None);
        let first = machine.add(GameStatus::Want).unwrap();
        let second = machine.change_status(GameStatus::Playing).unwrap().unwrap();
        machine.complete_mutation(first.request(), Ok(()));
        machine.complete_mutation(second.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Want));
    }

    #[test]
    fn late_failure_of_older_change_keeps_confirmed_newer_one() {
        let mut machine = loaded(None);
        let first = machine.add(GameStatus::Want).unwrap();
        let second = machine.change_status(GameStatus::Playing).unwrap().unwrap();

        assert_eq!(machine.complete_mutation(second.request(), Ok(())), Outcome::Confirmed);
        let outcome = machine.complete_mutation(first.request(), Err(unavailable()));
        assert_eq!(outcome, Outcome::Superseded(unavailable()));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Playing));
        assert_eq!(machine.confirmed(), Some(Some(GameStatus::Playing)));
    }

    #[test]
    fn late_confirmation_of_older_change_keeps_newer_remote_value() {
        let mut machine = loaded(None);
        let first = machine.add(GameStatus::Want).unwrap();
        let second = machine.change_status(GameStatus::Playing).unwrap().unwrap();

        machine.complete_mutation(second.request(), Ok(()));
        machine.complete_mutation(first.request(), Ok(()));
        assert_eq!(machine.confirmed(), Some(Some(GameStatus::Playing)));
    }

    #[test]
    fn failure_between_confirmed_changes_keeps_rollback_target() {
        let mut machine = loaded(None);
        let first = machine.add(GameStatus::Want).unwrap();
        let second = machine.change_status(GameStatus::Playing).unwrap().unwrap();
        let third = machine.change_status(GameStatus::Completed).unwrap().unwrap();

        machine.complete_mutation(second.request(), Ok(()));
        machine.complete_mutation(first.request(), Err(unavailable()));
        // The third change rolls back to the confirmed second one, not to
        // the state before the failed first one.
        let outcome = machine.complete_mutation(third.request(), Err(unavailable()));
        assert_eq!(
            outcome,
            Outcome::RolledBack {
                restored: StatusState::Tracked(GameStatus::Playing),
                error: unavailable(),
            }
        );
    }

    #[test]
    fn user_action_beats_in_flight_fetch() {
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        let add = machine.add(GameStatus::Completed).unwrap();

        let outcome = machine.complete_fetch(fetch.request(), Ok(None));
        assert_eq!(outcome, Outcome::Discarded);
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Completed));
        assert_eq!(machine.confirmed(), Some(None));

        machine.complete_mutation(add.request(), Ok(()));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Completed));
    }

    #[test]
    fn rollback_to_loading_follows_fetch_progress() {
        // Fetch still outstanding: back to Loading, and the fetch then applies.
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        let add = machine.add(GameStatus::Want).unwrap();
        machine.complete_mutation(add.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::Loading);
        machine.complete_fetch(fetch.request(), Ok(Some(record(GameStatus::Playing))));
        assert_eq!(machine.state(), StatusState::Tracked(GameStatus::Playing));

        // Fetch already resolved: land on what it reported.
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        let add = machine.add(GameStatus::Want).unwrap();
        machine.complete_fetch(fetch.request(), Ok(None));
        machine.complete_mutation(add.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::Untracked);

        // Fetch failed: surface the load error.
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        let add = machine.add(GameStatus::Want).unwrap();
        machine.complete_fetch(fetch.request(), Err(unavailable()));
        machine.complete_mutation(add.request(), Err(unavailable()));
        assert_eq!(machine.state(), StatusState::LoadError);
    }

    #[test]
    fn reset_discards_late_completions() {
        let mut machine = StatusMachine::new();
        let fetch = machine.load().unwrap();
        machine.reset();
        assert_eq!(machine.state(), StatusState::Unknown);
        assert_eq!(
            machine.complete_fetch(fetch.request(), Ok(None)),
            Outcome::Discarded
        );

        let mut machine = loaded(Some(GameStatus::Completed));
        let remove = machine.remove().unwrap();
        machine.reset();
        assert_eq!(
            machine.complete_mutation(remove.request(), Err(unavailable())),
            Outcome::Discarded
        );
        assert_eq!(machine.state(), StatusState::Unknown);
    }

    #[test]
    fn unknown_request_ids_are_discarded() {
        let mut machine = loaded(None);
        assert_eq!(machine.complete_fetch(999, Ok(None)), Outcome::Discarded);
        assert_eq!(machine.complete_mutation(999, Ok(())), Outcome::Discarded);
    }
}
