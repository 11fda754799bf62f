//! Counter store shared across replicas through Redis.
//!
//! Each rate key maps to two Redis keys: a counter whose TTL is the window,
//! and a block marker whose TTL is the block duration. Redis expiry enforces
//! both the window rollover and the end of a block.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use tracing::{debug, info, warn};

use super::{CounterStore, StoreError};
use crate::config::RedisConfig;

/// Increment the counter and start its window TTL if it has none.
///
/// Runs atomically on the server, so a counter can never be left without an
/// expiry and later increments never push the window end forward.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Counter store backed by a Redis server.
pub struct RedisStore {
    /// `None` once the store has been closed
    connection: RwLock<Option<ConnectionManager>>,
    increment_script: Script,
    key_prefix: String,
    operation_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis and verify the server answers.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let info = config.connection_info()?;
        let client = redis::Client::open(info)?;
        let timeout = config.operation_timeout;

        let mut connection = bounded(
            "connect",
            timeout,
            ConnectionManager::new(client),
        )
        .await?;

        let _: String = bounded(
            "ping",
            timeout,
            redis::cmd("PING").query_async(&mut connection),
        )
        .await?;

        info!(
            prefix = %config.key_prefix,
            timeout = ?timeout,
            "Connected to Redis"
        );

        Ok(Self {
            connection: RwLock::new(Some(connection)),
            increment_script: Script::new(INCREMENT_SCRIPT),
            key_prefix: config.key_prefix.clone(),
            operation_timeout: timeout,
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.connection.read().clone().ok_or(StoreError::Closed)
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}:count:{}", self.key_prefix, key)
    }

    fn block_key(&self, key: &str) -> String {
        format!("{}:block:{}", self.key_prefix, key)
    }
}

/// Await a Redis round trip, failing with [`StoreError::Timeout`] past `after`.
async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            warn!(operation = operation, after = ?after, "Redis operation timed out");
            Err(StoreError::Timeout { operation, after })
        }
    }
}

/// Whole milliseconds, never zero (Redis rejects a zero expiry).
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        let counter_key = self.counter_key(key);

        let mut invocation = self.increment_script.key(&counter_key);
        invocation.arg(millis(window));

        bounded(
            "increment",
            self.operation_timeout,
            invocation.invoke_async(&mut conn),
        )
        .await
    }

    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;

        bounded(
            "is_blocked",
            self.operation_timeout,
            redis::cmd("EXISTS")
                .arg(self.block_key(key))
                .query_async(&mut conn),
        )
        .await
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let until = SystemTime::now()
            .checked_add(duration)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(millis)
            .unwrap_or_default();

        let _: () = bounded(
            "block",
            self.operation_timeout,
            redis::cmd("SET")
                .arg(self.block_key(key))
                .arg(until)
                .arg("PX")
                .arg(millis(duration))
                .query_async(&mut conn),
        )
        .await?;

        debug!(key = %key, duration = ?duration, "Blocked key");
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;

        bounded(
            "reset",
            self.operation_timeout,
            redis::cmd("DEL")
                .arg(self.counter_key(key))
                .arg(self.block_key(key))
                .query_async(&mut conn),
        )
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.connection.write().take().is_some() {
            debug!("Closed Redis counter store");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
