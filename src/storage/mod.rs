//! Counter storage for rate limiting state.
//!
//! A [`CounterStore`] owns every window and block entry. Two backends share
//! the same contract: [`MemoryStore`] keeps state in-process, [`RedisStore`]
//! shares it across replicas through Redis.

mod memory;
mod remote;

#[cfg(test)]
pub(crate) mod conformance;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{BackendKind, StorageConfig};

pub use self::memory::MemoryStore;
pub use self::remote::RedisStore;

/// Errors raised by a counter store.
///
/// A failed operation is never reported as "not blocked" or as a count.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend did not answer within the operation timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The remote backend reported a failure
    #[error("Redis error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A block deadline cannot be represented by the backend clock
    #[error("block duration {0:?} is out of range")]
    DurationOutOfRange(Duration),

    /// The store has been closed
    #[error("counter store is closed")]
    Closed,
}

/// Storage contract for fixed-window counting and block state.
///
/// Every operation is atomic per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request for `key` and return the count in the current window.
    ///
    /// The first request of a window returns 1.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;

    /// Whether `key` is blocked right now. Expired blocks read as not blocked.
    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError>;

    /// Block `key` for `duration` from now, replacing any existing block.
    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError>;

    /// Forget all state for `key`.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Release backend resources. Calling it again is a no-op.
    async fn close(&self) -> Result<(), StoreError>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Build the counter store selected by the configuration.
///
/// Connection failures surface as [`TurnstileError::Store`](crate::error::TurnstileError::Store).
pub async fn connect(config: &StorageConfig) -> crate::error::Result<Arc<dyn CounterStore>> {
    let store: Arc<dyn CounterStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Redis => Arc::new(RedisStore::connect(&config.redis).await?),
    };

    info!(backend = store.name(), "Counter store initialized");
    Ok(store)
}
