//! Process-wide session context.
//!
//! [`SessionStore`] is the single writer of the active [`Identity`]. Every
//! other component holds a [`SessionReader`], which can take snapshots and
//! wait for changes but never mutate.
//!
//! The identity lives in a [`tokio::sync::watch`] channel, so each update is
//! one atomic replacement: readers see either the previous identity or the
//! new one.
//!
//! # Example
//!
//! ```
//! use game_status_client::{Identity, SessionStore};
//!
//! let session = SessionStore::new();
//! let reader = session.reader();
//! assert!(reader.current_identity().is_none());
//!
//! session.sign_in(Identity::new(7_u64));
//! assert_eq!(reader.current_user_id().map(|id| id.to_string()), Some("7".into()));
//!
//! session.sign_out();
//! assert!(!reader.is_signed_in());
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::protocol::{Identity, UserId};

/// Owner of the active identity.
///
/// Cloning yields another handle to the same session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl SessionStore {
    /// Create a store with nobody signed in.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Make `identity` the active session, replacing any previous one.
    ///
    /// The identity's shape is not validated. Readers are only notified
    /// when the stored identity actually changes.
    pub fn sign_in(&self, identity: Identity) {
        info!(user_id = %identity.user_id(), "signing in");
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&identity) {
                return false;
            }
            *current = Some(identity);
            true
        });
    }

    /// Clear the active session. A no-op when already signed out.
    pub fn sign_out(&self) {
        let cleared = self.tx.send_if_modified(|current| current.take().is_some());
        if cleared {
            info!("signed out");
        } else {
            debug!("sign out requested while already signed out");
        }
    }

    /// Snapshot of the active identity.
    pub fn current_identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Returns `true` if an identity is active.
    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Hand out a read-only view of this session.
    pub fn reader(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle to a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Option<Identity>>,
}

impl SessionReader {
    /// Snapshot of the active identity.
    pub fn current_identity(&self) -> Option<Identity> {
        self.rx.borrow().clone()
    }

    /// User id of the active identity, if any.
    pub fn current_user_id(&self) -> Option<UserId> {
        self.rx
            .borrow()
            .as_ref()
            .map(|identity| identity.user_id().clone())
    }

    /// Returns `true` if an identity is active.
    pub fn is_signed_in(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until the active identity changes and return the new value.
    ///
    /// Returns `None` once every [`SessionStore`] handle has been dropped.
    ///
    /// # Cancel Safety
    ///
    /// Cancel-safe: a dropped call does not consume the pending change.
    pub async fn changed(&mut self) -> Option<Option<Identity>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
