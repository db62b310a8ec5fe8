#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for game status client integration tests.
//!
//! Provides a scriptable [`MockStore`] that records every call, can fail the
//! next call of a given kind, and can hold calls until the test releases them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use game_status_client::{
    GameId, GameStatus, MemoryStatusStore, StatusEvent, StatusRecord, StatusRecordStore,
    StatusState, StoreError, UserId,
};
use tokio::sync::{mpsc, Semaphore};

/// How long a test waits for an expected event before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

// ── MockStore ───────────────────────────────────────────────────────

/// A call received by [`MockStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(UserId, GameId),
    Upsert(UserId, GameId, GameStatus),
    Delete(UserId, GameId),
}

/// A record store for integration testing.
///
/// Calls are delegated to a [`MemoryStatusStore`] unless a scripted failure
/// is queued for their kind. When gated, each call waits for one permit
/// from [`MockStore::release`] after it has been recorded.
pub struct MockStore {
    pub records: MemoryStatusStore,
    calls: StdMutex<Vec<Call>>,
    fetch_failures: StdMutex<VecDeque<StoreError>>,
    upsert_failures: StdMutex<VecDeque<StoreError>>,
    delete_failures: StdMutex<VecDeque<StoreError>>,
    gate: Option<Semaphore>,
}

impl MockStore {
    /// A store that answers immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// A store that holds every call until released.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            records: MemoryStatusStore::new(),
            calls: StdMutex::new(Vec::new()),
            fetch_failures: StdMutex::new(VecDeque::new()),
            upsert_failures: StdMutex::new(VecDeque::new()),
            delete_failures: StdMutex::new(VecDeque::new()),
            gate,
        }
    }

    /// Let `count` held calls proceed.
    pub fn release(&self, count: usize) {
        self.gate
            .as_ref()
            .expect("release on an ungated store")
            .add_permits(count);
    }

    pub fn fail_next_fetch(&self, error: StoreError) {
        self.fetch_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_upsert(&self, error: StoreError) {
        self.upsert_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_delete(&self, error: StoreError) {
        self.delete_failures.lock().unwrap().push_back(error);
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Wait until at least `count` calls have been received.
    pub async fn wait_for_calls(&self, count: usize) -> Vec<Call> {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} store calls, got {:?}", self.calls()))
    }

    async fn enter(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        if let Some(ref gate) = self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl StatusRecordStore for MockStore {
    async fn fetch_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
    ) -> Result<Option<StatusRecord>, StoreError> {
        self.enter(Call::Fetch(user_id.clone(), game_id)).await;
        if let Some(error) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.records.fetch_status(user_id, game_id).await
    }

    async fn upsert_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
        status: GameStatus,
    ) -> Result<StatusRecord, StoreError> {
        self.enter(Call::Upsert(user_id.clone(), game_id, status)).await;
        if let Some(error) = self.upsert_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.records.upsert_status(user_id, game_id, status).await
    }

    async fn delete_status(&self, user_id: &UserId, game_id: GameId) -> Result<(), StoreError> {
        self.enter(Call::Delete(user_id.clone(), game_id)).await;
        if let Some(error) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.records.delete_status(user_id, game_id).await
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut mpsc::Receiver<StatusEvent>) -> StatusEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive the next event and assert it is a `StateChanged` to `expected`.
pub async fn expect_state(rx: &mut mpsc::Receiver<StatusEvent>, expected: StatusState) {
    let ev = next_event(rx).await;
    assert_eq!(
        ev,
        StatusEvent::StateChanged { state: expected },
        "expected StateChanged({expected}), got {ev:?}"
    );
}

/// Assert that no event arrives within a short window.
pub async fn expect_quiet(rx: &mut mpsc::Receiver<StatusEvent>) {
    if let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("expected no event, got {ev:?}");
    }
}

/// Install a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
