//! Pluggable storage backends for OTP records.
//!
//! Every backend exposes the same three atomic operations over records
//! addressed by `(namespace, id)`. The gateway never composes them into a
//! read-modify-write sequence of its own; each call is one indivisible unit
//! against the backing store, which is what keeps the attempt budget exact
//! under concurrent requests.

use crate::otp::{NewOtp, OtpError, OtpRecord};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "memory-storage")]
mod memory;
#[cfg(feature = "memory-storage")]
pub use memory::MemoryStorage;

#[cfg(feature = "sqlite-storage")]
mod sqlite;
#[cfg(feature = "sqlite-storage")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "redis-storage")]
mod redis;
#[cfg(feature = "redis-storage")]
pub use redis::RedisStorage;

/// Statistics about the storage backend.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Number of live records
    pub total_records: usize,
    /// Additional backend-specific information
    pub backend_info: String,
}

/// Abstract storage backend for OTP records.
///
/// # Available Implementations
///
/// - `MemoryStorage` - `memory-storage` feature (default), in-process HashMap
/// - `SqliteStorage` - `sqlite-storage` feature, persistent SQLite storage
/// - `RedisStorage` - `redis-storage` feature, shared Redis storage
///
/// # Atomicity
///
/// Each method must execute as a single atomic unit against the store. In
/// particular, two concurrent `read(.., true)` calls on the same key must
/// both be counted and must observe distinct attempt values, and `create`
/// must check the lock of the record it replaces in the same unit that
/// writes the new one.
///
/// # Expiry
///
/// A record whose TTL has elapsed is indistinguishable from one that never
/// existed: every method reports [`OtpError::NotFound`] for it (or, for
/// `create`, simply writes a fresh record).
#[async_trait]
pub trait OtpStorage: Send + Sync {
    /// Optional method for storage backend initialization.
    ///
    /// Called once by the gateway builder. Implementations can create
    /// schemas or check connectivity here.
    async fn init(&self) -> Result<(), OtpError> {
        Ok(())
    }

    /// Writes a new record with `attempts = 1` that expires `ttl` from now.
    ///
    /// A live record under the same key is replaced, TTL included, unless it
    /// is locked, in which case nothing is written and
    /// `OtpError::Locked` is returned with the existing record.
    async fn create(
        &self,
        namespace: &str,
        id: &str,
        otp: &NewOtp,
        ttl: Duration,
    ) -> Result<OtpRecord, OtpError>;

    /// Loads a record, optionally incrementing its attempt counter first.
    ///
    /// With `increment`, the returned record carries the post-increment
    /// count. The expiry deadline is never touched.
    ///
    /// # Returns
    ///
    /// * `Ok(OtpRecord)` - The live record with its remaining TTL
    /// * `Err(OtpError::NotFound)` - If the key is absent or expired
    /// * `Err(OtpError)` - If there was an error accessing storage
    async fn read(&self, namespace: &str, id: &str, increment: bool)
    -> Result<OtpRecord, OtpError>;

    /// Marks a record as closed and returns it.
    ///
    /// Fails with `OtpError::NotFound` under the same conditions as `read`.
    /// The expiry deadline is left unchanged.
    async fn close(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError>;

    /// Removes expired records that the backend does not evict by itself.
    ///
    /// Returns the number of records removed. Backends with native expiry
    /// keep the default, which removes nothing.
    async fn cleanup_expired(&self) -> Result<usize, OtpError> {
        Ok(0)
    }

    /// Returns statistics about the storage backend.
    async fn get_stats(&self) -> Result<StorageStats, OtpError>;
}
