//! In-process counter store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{CounterStore, StoreError};

/// Window and block state for a single key.
#[derive(Debug, Default)]
struct WindowEntry {
    /// Requests seen in the current window
    counter: u64,
    /// When the current window began; `None` until the first increment
    window_start: Option<Instant>,
    /// End of the active block, if any
    blocked_until: Option<Instant>,
}

impl WindowEntry {
    /// Count one request, rolling the window over once it has lapsed.
    fn record(&mut self, now: Instant, window: Duration) -> u64 {
        match self.window_start {
            Some(start) if now.duration_since(start) < window => {
                self.counter += 1;
            }
            _ => {
                self.counter = 1;
                self.window_start = Some(now);
            }
        }
        self.counter
    }

    /// Check the block, clearing it if it has expired.
    fn check_block(&mut self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) if until > now => true,
            Some(_) => {
                self.blocked_until = None;
                false
            }
            None => false,
        }
    }
}

/// Counter store backed by a sharded in-memory map.
///
/// Every read-modify-write runs under the entry's shard lock, so increments on
/// one key are never lost and unrelated keys in other shards never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, WindowEntry>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        self.ensure_open()?;

        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_default();
        let count = entry.record(now, window);

        trace!(key = %key, count = count, "Incremented counter");
        Ok(count)
    }

    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;

        let now = Instant::now();
        let blocked = match self.entries.get_mut(key) {
            Some(mut entry) => entry.check_block(now),
            None => false,
        };
        Ok(blocked)
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError> {
        self.ensure_open()?;

        let until = Instant::now()
            .checked_add(duration)
            .ok_or(StoreError::DurationOutOfRange(duration))?;
        self.entries.entry(key.to_string()).or_default().blocked_until = Some(until);

        debug!(key = %key, duration = ?duration, "Blocked key");
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.entries.clear();
            debug!("Closed in-memory counter store");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
