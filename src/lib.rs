//! # Game Status Client
//!
//! Per-user game library tracking: whether a game is wanted, being played or
//! completed, kept in a remote record store and shown through an optimistic,
//! rollback-capable view.
//!
//! ## Features
//!
//! - **Session-scoped** — every record belongs to the signed-in identity held
//!   by a [`SessionStore`]; views are invalidated when it changes
//! - **Optimistic** — actions update the view immediately and roll back with
//!   an error event if the store rejects them
//! - **Store-agnostic** — implement [`StatusRecordStore`] for any backend;
//!   [`MemoryStatusStore`] and the REST-backed `HttpStatusStore` ship in-crate
//! - **Event-driven** — receive typed [`StatusEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use game_status_client::{
//!     ControllerConfig, GameStatus, GameStatusController, Identity, MemoryStatusStore,
//!     SessionStore, StatusEvent, StatusState,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> game_status_client::Result<()> {
//! let session = SessionStore::new();
//! session.sign_in(Identity::new(42_u64));
//!
//! let store = Arc::new(MemoryStatusStore::new());
//! let (mut controller, mut events) =
//!     GameStatusController::start(store, session.reader(), 1942, ControllerConfig::new());
//!
//! controller.load()?;
//! while let Some(event) = events.recv().await {
//!     if event == (StatusEvent::StateChanged { state: StatusState::Untracked }) {
//!         break;
//!     }
//! }
//!
//! controller.add(GameStatus::Playing)?;
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod controller;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;
pub mod stores;

// Re-export primary types for ergonomic imports.
pub use controller::{ControllerConfig, GameStatusController};
pub use error::{GameStatusError, Result, StoreError};
pub use event::StatusEvent;
pub use protocol::{GameId, GameStatus, Identity, StatusRecord, UserId};
pub use session::{SessionReader, SessionStore};
pub use state::{StatusMachine, StatusState};
pub use store::StatusRecordStore;
pub use stores::MemoryStatusStore;

#[cfg(feature = "store-http")]
pub use stores::{HttpStatusStore, HttpStoreConfig};
