//! In-process record store.
//!
//! [`MemoryStatusStore`] is the idealized store: it never fails, writes are
//! visible to the next read, and cloned handles share one map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::protocol::{GameId, GameStatus, StatusRecord, UserId};
use crate::store::StatusRecordStore;

type RecordMap = HashMap<(UserId, GameId), GameStatus>;

/// A [`StatusRecordStore`] backed by a shared in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    records: Arc<Mutex<RecordMap>>,
}

impl MemoryStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all users.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no records exist.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every record belonging to `user_id`, ordered by game id.
    pub fn records_for(&self, user_id: &UserId) -> Vec<StatusRecord> {
        let mut records: Vec<StatusRecord> = self
            .lock()
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|((owner, game_id), status)| StatusRecord {
                game_id: *game_id,
                user_id: owner.clone(),
                current_status: *status,
            })
            .collect();
        records.sort_by_key(|record| record.game_id);
        records
    }

    // Nothing held under the lock can be left half-written, so a poisoned
    // map is still consistent.
    fn lock(&self) -> MutexGuard<'_, RecordMap> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StatusRecordStore for MemoryStatusStore {
    async fn fetch_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
    ) -> Result<Option<StatusRecord>, StoreError> {
        let status = self.lock().get(&(user_id.clone(), game_id)).copied();
        Ok(status.map(|current_status| StatusRecord {
            game_id,
            user_id: user_id.clone(),
            current_status,
        }))
    }

    async fn upsert_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
        status: GameStatus,
    ) -> Result<StatusRecord, StoreError> {
        let previous = self.lock().insert((user_id.clone(), game_id), status);
        debug!(%user_id, game_id, %status, ?previous, "memory store upsert");
        Ok(StatusRecord {
            game_id,
            user_id: user_id.clone(),
            current_status: status,
        })
    }

    async fn delete_status(&self, user_id: &UserId, game_id: GameId) -> Result<(), StoreError> {
        let removed = self.lock().remove(&(user_id.clone(), game_id));
        debug!(%user_id, game_id, existed = removed.is_some(), "memory store delete");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::Numeric(1)
    }

    #[tokio::test]
    async fn absent_record_is_none() {
        let store = MemoryStatusStore::new();
        assert_eq!(store.fetch_status(&alice(), 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_then_fetch_sees_the_write() {
        let store = MemoryStatusStore::new();
        for status in GameStatus::ALL {
            store.upsert_status(&alice(), 10, status).await.unwrap();
            let record = store.fetch_status(&alice(), 10).await.unwrap().unwrap();
            assert_eq!(record.current_status, status);
        }
    }

    #[tokio::test]
    async fn repeated_upsert_keeps_one_record() {
        let store = MemoryStatusStore::new();
        let first = store.upsert_status(&alice(), 10, GameStatus::Want).await.unwrap();
        let second = store.upsert_status(&alice(), 10, GameStatus::Want).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStatusStore::new();
        store.upsert_status(&alice(), 10, GameStatus::Playing).await.unwrap();
        store.delete_status(&alice(), 10).await.unwrap();
        store.delete_status(&alice(), 10).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.fetch_status(&alice(), 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_are_scoped_per_user() {
        let store = MemoryStatusStore::new();
        let bob = UserId::from("bob");
        store.upsert_status(&alice(), 20, GameStatus::Want).await.unwrap();
        store.upsert_status(&alice(), 10, GameStatus::Completed).await.unwrap();
        store.upsert_status(&bob, 10, GameStatus::Playing).await.unwrap();

        let games: Vec<GameId> = store.records_for(&alice()).iter().map(|r| r.game_id).collect();
        assert_eq!(games, vec![10, 20]);
        assert_eq!(
            store.fetch_status(&bob, 10).await.unwrap().unwrap().current_status,
            GameStatus::Playing
        );
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = MemoryStatusStore::new();
        let handle = store.clone();
        handle.upsert_status(&alice(), 5, GameStatus::Want).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
