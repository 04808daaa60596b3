//! Key-value store access
//!
//! The administration layer only needs three primitives from the store:
//! open a connection, page through keys with a cursor, and delete keys.
//! [`CacheStore`] opens connections; the returned [`StoreConnection`] is an
//! owned handle that is released when dropped, so every operation holds the
//! connection for exactly its own scope.
//!
//! - [`RedisStore`]: the production backend
//! - [`MemoryStore`]: in-process backend with Redis `SCAN MATCH` semantics

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisConnection, RedisStore};

use crate::error::Result;
use crate::models::ScanPage;
use async_trait::async_trait;

/// An open connection to the store
#[async_trait]
pub trait StoreConnection: Send {
    /// One incremental SCAN step.
    ///
    /// Start with cursor 0; the store returns cursor 0 once the pass is
    /// complete. `count` is a hint, pages may be larger, smaller or empty.
    async fn scan(&mut self, pattern: &str, cursor: u64, count: usize) -> Result<ScanPage>;

    /// Delete `keys`, returning how many actually existed
    async fn delete(&mut self, keys: &[String]) -> Result<u64>;
}

/// Something that can open store connections
#[async_trait]
pub trait CacheStore: Send + Sync {
    type Connection: StoreConnection;

    /// Open a connection.
    ///
    /// Fails with `NotConfigured` when no connection settings exist and with
    /// `ConnectionError` when connect, auth or database selection fail.
    async fn connect(&self) -> Result<Self::Connection>;
}
