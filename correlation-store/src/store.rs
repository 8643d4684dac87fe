use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// The shared key-value store used as the cross-task rendezvous point.
///
/// The operations mirror the small subset of a Redis-like server the bridge
/// depends on. `incr` must be atomic against concurrent callers: invoke-id
/// uniqueness relies on it.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value without expiry, replacing any existing value and TTL.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store a value that disappears after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Atomically increment an integer value (missing keys count as 0).
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Add a member to a set. Returns whether it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns whether it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Keys matching a glob pattern (`*` and `?`).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Release the connection. Later calls fail with `StoreError::Closed`.
    async fn close(&self) -> Result<()>;
}
