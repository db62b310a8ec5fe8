//! # Track Game Example
//!
//! Walks one game through a user's library:
//!
//! 1. Sign a user in
//! 2. Load the game's status
//! 3. Add it as wanted, start playing it, then remove it
//! 4. Sign out and watch the view invalidate
//!
//! ## Running
//!
//! ```sh
//! # In-memory store:
//! cargo run --example track_game
//!
//! # Against a status endpoint:
//! STATUS_API_URL=http://localhost:3000 cargo run --example track_game
//! ```

use std::sync::Arc;

use game_status_client::{
    ControllerConfig, GameStatus, GameStatusController, HttpStatusStore, HttpStoreConfig,
    Identity, MemoryStatusStore, SessionStore, StatusEvent, StatusRecordStore, StatusState,
};
use game_status_client::stores::http::ENV_BASE_URL;
use tokio::sync::mpsc;

/// Catalog id of the game being tracked.
const GAME_ID: u64 = 1942;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Store ───────────────────────────────────────────────────────
    // Fall back to memory only when no endpoint is configured; any other
    // configuration error is reported.
    let store: Arc<dyn StatusRecordStore> = if std::env::var(ENV_BASE_URL).is_ok() {
        let config = HttpStoreConfig::from_env()?;
        tracing::info!("Using status endpoint at {}", config.base_url);
        Arc::new(HttpStatusStore::new(config)?)
    } else {
        tracing::info!("{ENV_BASE_URL} not set, using in-memory store");
        Arc::new(MemoryStatusStore::new())
    };

    // ── Session ─────────────────────────────────────────────────────
    let session = SessionStore::new();
    session.sign_in(Identity::new(1_u64));

    let (mut controller, mut events) = GameStatusController::start(
        store,
        session.reader(),
        GAME_ID,
        ControllerConfig::new(),
    );

    // ── Walkthrough ─────────────────────────────────────────────────
    controller.load()?;
    let loaded = settle(&mut events).await;
    tracing::info!("Game {GAME_ID} is {loaded}");

    if loaded == StatusState::Untracked {
        controller.add(GameStatus::Want)?;
        settle(&mut events).await;
    }
    controller.change_status(GameStatus::Playing)?;
    settle(&mut events).await;
    controller.remove()?;
    settle(&mut events).await;

    session.sign_out();
    settle(&mut events).await;

    controller.shutdown().await;
    Ok(())
}

/// Log events until the view is quiet for a moment; return the last state.
async fn settle(events: &mut mpsc::Receiver<StatusEvent>) -> StatusState {
    let mut state = StatusState::Unknown;
    while let Ok(Some(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(200), events.recv()).await
    {
        match event {
            StatusEvent::StateChanged { state: next } => {
                tracing::info!("State: {next}");
                state = next;
            }
            StatusEvent::LoadFailed { error } => {
                tracing::warn!("Could not load status: {error}");
            }
            StatusEvent::MutationFailed { error, restored } => {
                tracing::warn!("Update failed ({error}), restored: {restored:?}");
            }
            StatusEvent::ActionRejected { error } => {
                tracing::warn!("Action rejected: {error}");
            }
            StatusEvent::SessionInvalidated => {
                tracing::info!("Signed-in user changed; view reset");
            }
        }
    }
    state
}
