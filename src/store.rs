//! Record store abstraction for per-game status records.
//!
//! The [`StatusRecordStore`] trait is the controller's only view of the
//! remote persistence endpoint. Every operation is addressed by the
//! `(user_id, game_id)` pair and every implementation must honour the same
//! contract:
//!
//! - a missing record is `Ok(None)`, never an error;
//! - `upsert_status` overwrites, so repeating it leaves exactly one record;
//! - `delete_status` succeeds when the record is already gone.
//!
//! # Implementing a Custom Store
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use game_status_client::error::StoreError;
//! use game_status_client::protocol::{GameId, GameStatus, StatusRecord, UserId};
//! use game_status_client::store::StatusRecordStore;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl StatusRecordStore for MyStore {
//!     async fn fetch_status(
//!         &self,
//!         user_id: &UserId,
//!         game_id: GameId,
//!     ) -> Result<Option<StatusRecord>, StoreError> {
//!         // Look the pair up; return Ok(None) when there is no record
//!         todo!()
//!     }
//!
//!     async fn upsert_status(
//!         &self,
//!         user_id: &UserId,
//!         game_id: GameId,
//!         status: GameStatus,
//!     ) -> Result<StatusRecord, StoreError> {
//!         // Create or overwrite the record for the pair
//!         todo!()
//!     }
//!
//!     async fn delete_status(&self, user_id: &UserId, game_id: GameId) -> Result<(), StoreError> {
//!         // Remove the record if present; succeed either way
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::StoreError;
use crate::protocol::{GameId, GameStatus, StatusRecord, UserId};

/// Remote persistence for status records.
///
/// The trait is object-safe; controllers share one store as
/// `Arc<dyn StatusRecordStore>`, so implementations take `&self` and handle
/// their own interior synchronization.
///
/// # Errors
///
/// All operations fail with [`StoreError::PersistenceUnavailable`] on
/// network or service failure and [`StoreError::Unauthorized`] when the
/// identity lacks rights to the record.
#[async_trait]
pub trait StatusRecordStore: Send + Sync + 'static {
    /// Read the record for the pair, or `None` if there is none.
    async fn fetch_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
    ) -> Result<Option<StatusRecord>, StoreError>;

    /// Create or overwrite the record for the pair and return it.
    async fn upsert_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
        status: GameStatus,
    ) -> Result<StatusRecord, StoreError>;

    /// Remove the record for the pair. Succeeds if it is already absent.
    async fn delete_status(&self, user_id: &UserId, game_id: GameId) -> Result<(), StoreError>;
}
