use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{Cmd, FromRedisValue, RedisError};

use crate::error::{Result, StoreError};
use crate::store::CorrelationStore;

/// Pause between connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Store backed by a Redis server.
///
/// Every bridge process pointed at the same server shares invoke ids,
/// response records and monitor records. The connection manager reconnects
/// on its own after transient failures.
pub struct RedisStore {
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    /// Connect to `url` (`redis://` or `rediss://`), retrying up to `attempts`
    /// times.
    pub async fn connect(url: &str, attempts: u32) -> Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;

        let attempts = attempts.max(1);
        let mut attempt = 0;
        let connection = loop {
            attempt += 1;
            match ConnectionManager::new(client.clone()).await {
                Ok(connection) => break connection,
                Err(e) if attempt < attempts => {
                    tracing::warn!("Store connection attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(unavailable(e)),
            }
        };

        tracing::info!("Connected to store after {} attempt(s)", attempt);
        Ok(Self {
            connection: RwLock::new(Some(connection)),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.connection.read().is_none()
    }

    async fn query<T: FromRedisValue>(&self, key: &str, cmd: &Cmd) -> Result<T> {
        let mut connection = self.connection.read().clone().ok_or(StoreError::Closed)?;
        cmd.query_async(&mut connection)
            .await
            .map_err(|e| classify(key, e))
    }
}

#[async_trait]
impl CorrelationStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let _: String = self.query("", &redis::cmd("PING")).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(key, redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.query(key, redis::cmd("SET").arg(key).arg(value)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.query(key, redis::cmd("SET").arg(key).arg(value).arg("PX").arg(millis))
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count: u64 = self.query(key, redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: u64 = self.query(key, redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.query(key, redis::cmd("INCR").arg(key)).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let added: u64 = self.query(key, redis::cmd("SADD").arg(key).arg(member)).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed: u64 = self.query(key, redis::cmd("SREM").arg(key).arg(member)).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut members: Vec<String> = self.query(key, redis::cmd("SMEMBERS").arg(key)).await?;
        members.sort();
        Ok(members)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    pattern,
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn close(&self) -> Result<()> {
        if self.connection.write().take().is_some() {
            tracing::info!("Store closed");
        }
        Ok(())
    }
}

/// Map a Redis error to the store's error kinds.
fn classify(key: &str, error: RedisError) -> StoreError {
    let wrong_type = error.code() == Some("WRONGTYPE")
        || error.detail().is_some_and(|detail| detail.contains("not an integer"));
    if wrong_type {
        StoreError::wrong_type(key)
    } else {
        unavailable(error)
    }
}

fn unavailable(error: RedisError) -> StoreError {
    StoreError::Unavailable(error.to_string())
}
