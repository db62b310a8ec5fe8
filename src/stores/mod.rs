//! [`StatusRecordStore`](crate::StatusRecordStore) implementations.
//!
//! | Store                 | Availability          | Use                                   |
//! |-----------------------|-----------------------|---------------------------------------|
//! | [`MemoryStatusStore`] | always                | tests, demos, offline mode            |
//! | [`HttpStatusStore`]   | `store-http` feature  | the REST status endpoint              |
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> game_status_client::Result<()> {
//! use game_status_client::{HttpStatusStore, HttpStoreConfig, StatusRecordStore, UserId};
//!
//! let store = HttpStatusStore::new(HttpStoreConfig::new("https://api.example.com/"))?;
//! let record = store.fetch_status(&UserId::from(42_u64), 1942).await?;
//! println!("current record: {record:?}");
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "store-http")]
pub mod http;

pub use memory::MemoryStatusStore;

#[cfg(feature = "store-http")]
pub use http::{HttpStatusStore, HttpStoreConfig};
