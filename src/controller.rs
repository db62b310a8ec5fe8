//! Async controller for one game's status view.
//!
//! [`GameStatusController`] is a thin handle over two background tasks:
//!
//! - the **controller loop**, which owns the view's [`StatusMachine`] and
//!   applies user actions, remote completions and session changes one at a
//!   time, in arrival order;
//! - the **request pipeline**, which executes remote calls against the
//!   [`StatusRecordStore`] strictly in issue order and reports completions
//!   back to the loop.
//!
//! Events are emitted on a bounded channel returned from
//! [`GameStatusController::start`]; the latest state is also available
//! synchronously through [`GameStatusController::state`].
//!
//! # Example
//!
//! ```rust,ignore
//! let (controller, mut events) = GameStatusController::start(
//!     store,
//!     session.reader(),
//!     game_id,
//!     ControllerConfig::new(),
//! );
//! controller.load()?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         StatusEvent::StateChanged { state } => render(state),
//!         StatusEvent::MutationFailed { error, .. } => alert(error),
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GameStatusError, Result, StoreError};
use crate::event::StatusEvent;
use crate::protocol::{GameId, GameStatus, Identity, StatusRecord, UserId};
use crate::session::SessionReader;
use crate::state::{Outcome, RemoteCall, RequestId, StatusMachine, StatusState};
use crate::store::StatusRecordStore;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameStatusController`].
///
/// # Example
///
/// ```
/// use game_status_client::ControllerConfig;
/// use std::time::Duration;
///
/// let config = ControllerConfig::new()
///     .with_event_channel_capacity(16)
///     .with_shutdown_timeout(Duration::from_millis(250));
/// assert_eq!(config.event_channel_capacity, 16);
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the view cannot keep up, events are dropped (with a warning
    /// logged) rather than blocking the controller loop. The latest state
    /// stays readable through [`GameStatusController::state`].
    ///
    /// Defaults to **64**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the controller loop is given to exit on
    /// [`GameStatusController::shutdown`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ControllerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the capacity of the bounded event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Liveness ────────────────────────────────────────────────────────

/// Liveness token tied to one view's lifetime.
///
/// Every request carries a clone. Once the view is discarded the token is
/// dead, and neither the pipeline nor the loop applies anything carrying it.
#[derive(Debug, Clone)]
struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// User actions queued from the handle to the controller loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Load,
    Retry,
    Add(GameStatus),
    ChangeStatus(GameStatus),
    Remove,
}

/// A remote call bound to the identity it was issued under.
#[derive(Debug)]
struct Job {
    call: RemoteCall,
    user_id: UserId,
    liveness: Liveness,
}

/// Result of a remote call, delivered back to the controller loop.
#[derive(Debug)]
enum Completion {
    Fetch {
        request: RequestId,
        result: std::result::Result<Option<StatusRecord>, StoreError>,
    },
    Mutation {
        request: RequestId,
        result: std::result::Result<(), StoreError>,
    },
}

// ── Controller handle ───────────────────────────────────────────────

/// Handle to the status view of one game.
///
/// Created via [`GameStatusController::start`]. Action methods queue the
/// action and return immediately; the outcome arrives as
/// [`StatusEvent`]s.
pub struct GameStatusController {
    view_id: Uuid,
    game_id: GameId,
    /// Sender half of the command channel to the controller loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    session: SessionReader,
    state_rx: watch::Receiver<StatusState>,
    liveness: Liveness,
    /// Handle to the controller loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Handle to the request pipeline task.
    pipeline: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the controller loop to stop.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl GameStatusController {
    /// Start the controller for `game_id` and return a handle plus event
    /// receiver.
    ///
    /// The view starts in [`StatusState::Unknown`]; call
    /// [`load`](Self::load) to fetch the current status.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        store: Arc<dyn StatusRecordStore>,
        session: SessionReader,
        game_id: GameId,
        config: ControllerConfig,
    ) -> (Self, mpsc::Receiver<StatusEvent>) {
        let view_id = Uuid::new_v4();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<StatusEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (state_tx, state_rx) = watch::channel(StatusState::Unknown);
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let (done_tx, done_rx) = mpsc::unbounded_channel::<Completion>();
        let liveness = Liveness::new();

        let pipeline = tokio::spawn(request_pipeline(store, game_id, job_rx, done_tx));

        let controller_loop = ControllerLoop {
            view_id,
            game_id,
            machine: StatusMachine::new(),
            bound: None,
            session: session.clone(),
            job_tx,
            event_tx,
            state_tx,
            liveness: liveness.clone(),
        };
        let task = tokio::spawn(controller_loop.run(cmd_rx, done_rx, session.clone(), shutdown_rx));

        debug!(%view_id, game_id, "status controller started");

        let controller = Self {
            view_id,
            game_id,
            cmd_tx,
            session,
            state_rx,
            liveness,
            task: Some(task),
            pipeline: Some(pipeline),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (controller, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Fetch the current status and bind the view to the active identity.
    ///
    /// # Errors
    ///
    /// Returns [`GameStatusError::NotSignedIn`] if nobody is signed in and
    /// [`GameStatusError::NotRunning`] once the controller has stopped.
    pub fn load(&self) -> Result<()> {
        self.send(Command::Load)
    }

    /// Re-run a failed load.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn retry(&self) -> Result<()> {
        self.send(Command::Retry)
    }

    /// Add the game to the library with `status`.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn add(&self, status: GameStatus) -> Result<()> {
        self.send(Command::Add(status))
    }

    /// Replace the tracked status with `status`.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn change_status(&self, status: GameStatus) -> Result<()> {
        self.send(Command::ChangeStatus(status))
    }

    /// Remove the game from the library.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn remove(&self) -> Result<()> {
        self.send(Command::Remove)
    }

    /// Discard the view.
    ///
    /// The liveness token is cleared first, so no completion arriving after
    /// this call changes the state. The event receiver yields `None` once
    /// the controller loop exits.
    pub async fn shutdown(&mut self) {
        debug!(view_id = %self.view_id, "status controller: shutdown requested");
        self.liveness.kill();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort
        // it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("controller loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("controller loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("controller loop aborted: {join_err}");
                    }
                }
            }
        }

        // Requests still queued or in flight are abandoned.
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.abort();
            if let Err(join_err) = pipeline.await {
                if !join_err.is_cancelled() {
                    warn!("request pipeline terminated with join error: {join_err}");
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The latest published state.
    pub fn state(&self) -> StatusState {
        *self.state_rx.borrow()
    }

    /// Catalog id of the game this view tracks.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Unique id of this view, as used in log fields.
    pub fn view_id(&self) -> Uuid {
        self.view_id
    }

    /// Returns `true` until the view is discarded or its loop stops.
    pub fn is_running(&self) -> bool {
        self.liveness.is_live()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `Command` to the controller loop.
    fn send(&self, command: Command) -> Result<()> {
        if !self.liveness.is_live() {
            return Err(GameStatusError::NotRunning);
        }
        if !self.session.is_signed_in() {
            return Err(GameStatusError::NotSignedIn);
        }
        self.cmd_tx
            .send(command)
            .map_err(|_| GameStatusError::NotRunning)
    }
}

impl std::fmt::Debug for GameStatusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStatusController")
            .field("view_id", &self.view_id)
            .field("game_id", &self.game_id)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for GameStatusController {
    fn drop(&mut self) {
        // `Drop` is synchronous, so the only safe action is to kill the
        // token and abort both tasks.
        self.liveness.kill();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.abort();
        }
    }
}

// ── Controller loop ─────────────────────────────────────────────────

/// State owned by the controller loop task.
struct ControllerLoop {
    view_id: Uuid,
    game_id: GameId,
    machine: StatusMachine,
    /// User the view was loaded for. `None` until `load`, and again after
    /// the session invalidated the view.
    bound: Option<UserId>,
    session: SessionReader,
    job_tx: mpsc::UnboundedSender<Job>,
    event_tx: mpsc::Sender<StatusEvent>,
    state_tx: watch::Sender<StatusState>,
    liveness: Liveness,
}

impl ControllerLoop {
    /// Multiplex commands, completions and session changes via
    /// `tokio::select!`.
    ///
    /// Exits when:
    /// - The command channel closes (handle dropped)
    /// - The request pipeline stops
    /// - The shutdown signal fires
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
        mut session_rx: SessionReader,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!(view_id = %self.view_id, "controller loop started");
        let mut session_open = true;

        loop {
            tokio::select! {
                // Branch 1: user action from the handle
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("command channel closed, stopping controller loop");
                            break;
                        }
                    }
                }

                // Branch 2: remote completion from the pipeline
                done = done_rx.recv() => {
                    match done {
                        Some(completion) => self.handle_completion(completion),
                        None => {
                            warn!(view_id = %self.view_id, "request pipeline stopped");
                            break;
                        }
                    }
                }

                // Branch 3: the active identity changed
                changed = session_rx.changed(), if session_open => {
                    match changed {
                        Some(identity) => self.handle_identity(identity.as_ref()),
                        // Every SessionStore handle is gone; the identity
                        // can no longer change.
                        None => session_open = false,
                    }
                }

                // Branch 4: shutdown signal
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break;
                }
            }
        }

        self.liveness.kill();
        debug!(view_id = %self.view_id, "controller loop exited");
    }

    fn handle_command(&mut self, command: Command) {
        let user_id = match self.authorize() {
            Ok(user_id) => user_id,
            Err(error) => {
                self.reject(error);
                return;
            }
        };

        let planned = match command {
            Command::Load => self.machine.load().map(Some),
            Command::Retry => self.machine.retry().map(Some),
            Command::Add(status) => self.machine.add(status).map(Some),
            Command::ChangeStatus(status) => self.machine.change_status(status),
            Command::Remove => self.machine.remove().map(Some),
        };

        match planned {
            Ok(Some(call)) => {
                if command == Command::Load {
                    info!(view_id = %self.view_id, game_id = self.game_id, %user_id, "view bound to identity");
                    self.bound = Some(user_id.clone());
                }
                debug!(view_id = %self.view_id, ?command, request = call.request(), "action applied");
                self.publish_state();
                self.dispatch(call, user_id);
            }
            Ok(None) => {}
            Err(error) => self.reject(error),
        }
    }

    /// Resolve the identity an action runs under.
    ///
    /// A view bound to a user only acts for that user; if the session has
    /// moved on, the view is invalidated and the action refused.
    fn authorize(&mut self) -> Result<UserId> {
        let Some(current) = self.session.current_user_id() else {
            if self.bound.is_some() {
                self.invalidate();
            }
            return Err(GameStatusError::NotSignedIn);
        };
        if self.bound.as_ref().is_some_and(|bound| *bound != current) {
            self.invalidate();
            return Err(GameStatusError::IdentityChanged);
        }
        Ok(current)
    }

    fn handle_completion(&mut self, completion: Completion) {
        if !self.liveness.is_live() {
            debug!(view_id = %self.view_id, "view discarded; dropping completion");
            return;
        }

        let outcome = match completion {
            Completion::Fetch { request, result } => self.machine.complete_fetch(request, result),
            Completion::Mutation { request, result } => {
                self.machine.complete_mutation(request, result)
            }
        };

        match outcome {
            Outcome::Applied(state) => {
                debug!(view_id = %self.view_id, %state, "remote state applied");
                self.publish_state();
            }
            Outcome::Confirmed => {
                debug!(view_id = %self.view_id, "mutation confirmed");
            }
            Outcome::LoadFailed(error) => {
                warn!(view_id = %self.view_id, game_id = self.game_id, %error, "status load failed");
                self.publish_state();
                self.emit(StatusEvent::LoadFailed {
                    error: error.into(),
                });
            }
            Outcome::RolledBack { restored, error } => {
                warn!(view_id = %self.view_id, game_id = self.game_id, %error, %restored, "mutation failed; rolled back");
                self.publish_state();
                self.emit(StatusEvent::MutationFailed {
                    error: error.into(),
                    restored: Some(restored),
                });
            }
            Outcome::Superseded(error) => {
                warn!(view_id = %self.view_id, game_id = self.game_id, %error, "superseded mutation failed");
                self.emit(StatusEvent::MutationFailed {
                    error: error.into(),
                    restored: None,
                });
            }
            Outcome::Discarded => {
                debug!(view_id = %self.view_id, "stale completion discarded");
            }
        }
    }

    fn handle_identity(&mut self, identity: Option<&Identity>) {
        let Some(ref bound) = self.bound else {
            return;
        };
        if identity.is_some_and(|identity| identity.user_id() == bound) {
            return;
        }
        self.invalidate();
    }

    /// Drop everything tied to the bound identity.
    fn invalidate(&mut self) {
        info!(view_id = %self.view_id, game_id = self.game_id, "identity changed; invalidating view");
        self.bound = None;
        self.machine.reset();
        self.emit(StatusEvent::SessionInvalidated);
        self.publish_state();
    }

    fn dispatch(&self, call: RemoteCall, user_id: UserId) {
        let job = Job {
            call,
            user_id,
            liveness: self.liveness.clone(),
        };
        if self.job_tx.send(job).is_err() {
            warn!(view_id = %self.view_id, "request pipeline closed; request dropped");
        }
    }

    fn reject(&self, error: GameStatusError) {
        debug!(view_id = %self.view_id, %error, "action rejected");
        self.emit(StatusEvent::ActionRejected { error });
    }

    /// Publish the machine's state, emitting `StateChanged` only on change.
    fn publish_state(&self) {
        let state = self.machine.state();
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.emit(StatusEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: StatusEvent) {
        emit_event(&self.event_tx, event);
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the controller loop.
fn emit_event(event_tx: &mpsc::Sender<StatusEvent>, event: StatusEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

// ── Request pipeline ────────────────────────────────────────────────

/// Execute queued remote calls one at a time, in issue order.
///
/// Jobs whose view has been discarded are skipped, and results that arrive
/// after the view was discarded are dropped.
async fn request_pipeline(
    store: Arc<dyn StatusRecordStore>,
    game_id: GameId,
    mut job_rx: mpsc::UnboundedReceiver<Job>,
    done_tx: mpsc::UnboundedSender<Completion>,
) {
    while let Some(job) = job_rx.recv().await {
        if !job.liveness.is_live() {
            debug!(request = job.call.request(), "view discarded; skipping queued request");
            continue;
        }

        let completion = execute(store.as_ref(), game_id, &job).await;

        if !job.liveness.is_live() {
            debug!(request = job.call.request(), "view discarded while request was in flight");
            continue;
        }
        if done_tx.send(completion).is_err() {
            break;
        }
    }
    debug!(game_id, "request pipeline exited");
}

async fn execute(store: &dyn StatusRecordStore, game_id: GameId, job: &Job) -> Completion {
    let user_id = &job.user_id;
    match job.call {
        RemoteCall::Fetch { request } => {
            let result = store.fetch_status(user_id, game_id).await;
            if let Err(ref error) = result {
                warn!(request, %user_id, game_id, %error, "fetch failed");
            }
            Completion::Fetch { request, result }
        }
        RemoteCall::Upsert { request, status } => {
            let result = store
                .upsert_status(user_id, game_id, status)
                .await
                .map(|_| ());
            if let Err(ref error) = result {
                warn!(request, %user_id, game_id, %status, %error, "upsert failed");
            }
            Completion::Mutation { request, result }
        }
        RemoteCall::Delete { request } => {
            let result = store.delete_status(user_id, game_id).await;
            if let Err(ref error) = result {
                warn!(request, %user_id, game_id, %error, "delete failed");
            }
            Completion::Mutation { request, result }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::stores::MemoryStatusStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    // ── Mock store ──────────────────────────────────────────────────

    /// A store whose fetch blocks until released, recording every call.
    struct HeldStore {
        release: Arc<Notify>,
        calls: Arc<StdMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl StatusRecordStore for HeldStore {
        async fn fetch_status(
            &self,
            _user_id: &UserId,
            _game_id: GameId,
        ) -> std::result::Result<Option<StatusRecord>, StoreError> {
            self.calls.lock().unwrap().push("fetch");
            self.release.notified().await;
            Ok(None)
        }

        async fn upsert_status(
            &self,
            user_id: &UserId,
            game_id: GameId,
            status: GameStatus,
        ) -> std::result::Result<StatusRecord, StoreError> {
            self.calls.lock().unwrap().push("upsert");
            Ok(StatusRecord {
                game_id,
                user_id: user_id.clone(),
                current_status: status,
            })
        }

        async fn delete_status(
            &self,
            _user_id: &UserId,
            _game_id: GameId,
        ) -> std::result::Result<(), StoreError> {
            self.calls.lock().unwrap().push("delete");
            Ok(())
        }
    }

    fn job(call: RemoteCall, liveness: &Liveness) -> Job {
        Job {
            call,
            user_id: UserId::Numeric(1),
            liveness: liveness.clone(),
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = ControllerConfig::new();
        assert_eq!(config.event_channel_capacity, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = ControllerConfig::new()
            .with_event_channel_capacity(8)
            .with_shutdown_timeout(Duration::from_millis(10));
        assert_eq!(config.event_channel_capacity, 8);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(10));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ControllerConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn liveness_is_shared_between_clones() {
        let liveness = Liveness::new();
        let carried = liveness.clone();
        assert!(carried.is_live());
        liveness.kill();
        assert!(!carried.is_live());
    }

    #[tokio::test]
    async fn pipeline_runs_jobs_in_issue_order() {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let release = Arc::new(Notify::new());
        let store = Arc::new(HeldStore {
            release: Arc::clone(&release),
            calls: Arc::clone(&calls),
        });
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let liveness = Liveness::new();
        tokio::spawn(request_pipeline(store, 7, job_rx, done_tx));

        job_tx.send(job(RemoteCall::Fetch { request: 1 }, &liveness)).unwrap();
        job_tx
            .send(job(
                RemoteCall::Upsert {
                    request: 2,
                    status: GameStatus::Want,
                },
                &liveness,
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*calls.lock().unwrap(), vec!["fetch"]);

        release.notify_one();
        let first = done_rx.recv().await.unwrap();
        assert!(matches!(first, Completion::Fetch { request: 1, .. }));
        let second = done_rx.recv().await.unwrap();
        assert!(matches!(second, Completion::Mutation { request: 2, result: Ok(()) }));
        assert_eq!(*calls.lock().unwrap(), vec!["fetch", "upsert"]);
    }

    #[tokio::test]
    async fn pipeline_drops_results_of_discarded_views() {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let release = Arc::new(Notify::new());
        let store = Arc::new(HeldStore {
            release: Arc::clone(&release),
            calls: Arc::clone(&calls),
        });
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let liveness = Liveness::new();
        tokio::spawn(request_pipeline(store, 7, job_rx, done_tx));

        job_tx.send(job(RemoteCall::Fetch { request: 1 }, &liveness)).unwrap();
        job_tx.send(job(RemoteCall::Delete { request: 2 }, &liveness)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Discard the view while the fetch is in flight.
        liveness.kill();
        release.notify_one();
        drop(job_tx);

        assert!(done_rx.recv().await.is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn actions_require_a_signed_in_identity() {
        let session = SessionStore::new();
        let store: Arc<dyn StatusRecordStore> = Arc::new(MemoryStatusStore::new());
        let (mut controller, _events) =
            GameStatusController::start(store, session.reader(), 1, ControllerConfig::new());

        assert_eq!(controller.load(), Err(GameStatusError::NotSignedIn));
        assert_eq!(controller.state(), StatusState::Unknown);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn not_running_after_shutdown() {
        let session = SessionStore::new();
        session.sign_in(Identity::new(1_u64));
        let store: Arc<dyn StatusRecordStore> = Arc::new(MemoryStatusStore::new());
        let (mut controller, mut events) =
            GameStatusController::start(store, session.reader(), 1, ControllerConfig::new());

        controller.shutdown().await;
        assert!(!controller.is_running());
        assert_eq!(controller.add(GameStatus::Want), Err(GameStatusError::NotRunning));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let session = SessionStore::new();
        let store: Arc<dyn StatusRecordStore> = Arc::new(MemoryStatusStore::new());
        let (mut controller, _events) =
            GameStatusController::start(store, session.reader(), 1, ControllerConfig::new());
        controller.shutdown().await;
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let session = SessionStore::new();
        session.sign_in(Identity::new(1_u64));
        let store: Arc<dyn StatusRecordStore> = Arc::new(MemoryStatusStore::new());
        let (controller, mut events) =
            GameStatusController::start(store, session.reader(), 1, ControllerConfig::new());
        controller.load().unwrap();
        drop(controller);

        // The aborted loop drops its sender, closing the channel.
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn debug_impl_for_controller() {
        let session = SessionStore::new();
        let store: Arc<dyn StatusRecordStore> = Arc::new(MemoryStatusStore::new());
        let (mut controller, _events) =
            GameStatusController::start(store, session.reader(), 1942, ControllerConfig::new());
        let rendered = format!("{controller:?}");
        assert!(rendered.contains("GameStatusController"));
        assert!(rendered.contains("1942"));
        assert!(rendered.contains("Unknown"));
        controller.shutdown().await;
    }
}
