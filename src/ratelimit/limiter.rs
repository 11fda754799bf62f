//! Core rate limiter implementation.

use std::sync::Arc;
use tracing::{debug, trace};

use super::key::RateKey;
use super::policy::{LimitPolicy, Policies};
use crate::storage::{CounterStore, StoreError};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request fits within the current window
    Allowed { count: u64, limit: u64 },
    /// The subject is serving a block from an earlier window
    Blocked,
    /// This request pushed the window over the limit; a block has been placed
    LimitExceeded { count: u64, limit: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Fixed-window rate limiter with a cool-down block.
///
/// All state lives in the counter store, so replicas sharing one store
/// enforce one budget. This struct is thread-safe and can be shared across
/// multiple tasks.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policies: Policies,
}

impl RateLimiter {
    /// Create a new rate limiter over a store with the given policies.
    pub fn new(store: Arc<dyn CounterStore>, policies: Policies) -> Self {
        Self { store, policies }
    }

    /// Check a key against the policy bound to its kind.
    pub async fn check(&self, key: &RateKey) -> Result<Decision, StoreError> {
        let policy = *self.policies.for_kind(key.kind());
        self.decide(key, &policy).await
    }

    /// Apply the fixed-window-then-block algorithm for one request.
    ///
    /// A blocked key is denied without being counted, so requests made during
    /// a block neither count nor extend it. Any store failure is returned
    /// as-is rather than turned into a decision.
    pub async fn decide(
        &self,
        key: &RateKey,
        policy: &LimitPolicy,
    ) -> Result<Decision, StoreError> {
        let storage_key = key.to_string();

        if self.store.is_blocked(&storage_key).await? {
            trace!(key = %key, "Key is blocked");
            return Ok(Decision::Blocked);
        }

        let count = self.store.increment(&storage_key, self.policies.window).await?;
        let limit = policy.limit_per_window;

        if count > limit {
            self.store.block(&storage_key, policy.block_duration).await?;
            debug!(
                key = %key,
                count = count,
                limit = limit,
                block = ?policy.block_duration,
                "Rate limit exceeded"
            );
            return Ok(Decision::LimitExceeded { count, limit });
        }

        trace!(key = %key, count = count, limit = limit, "Request allowed");
        Ok(Decision::Allowed { count, limit })
    }

    /// Forget all counting and block state for a key.
    pub async fn reset(&self, key: &RateKey) -> Result<(), StoreError> {
        self.store.reset(&key.to_string()).await
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}
