//! Behavioural checks every counter store backend must pass.
//!
//! Each check takes a key namespace so backends sharing external state can
//! run them without interfering with one another.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::{CounterStore, StoreError};

const WINDOW: Duration = Duration::from_millis(200);
const PAST_WINDOW: Duration = Duration::from_millis(300);

pub async fn counts_within_window(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:counts");

    for expected in 1..=5 {
        assert_eq!(store.increment(&key, Duration::from_secs(60)).await.unwrap(), expected);
    }
}

pub async fn window_rollover_restarts_count(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:rollover");

    for expected in 1..=3 {
        assert_eq!(store.increment(&key, WINDOW).await.unwrap(), expected);
    }

    tokio::time::sleep(PAST_WINDOW).await;
    assert_eq!(store.increment(&key, WINDOW).await.unwrap(), 1);
    assert_eq!(store.increment(&key, WINDOW).await.unwrap(), 2);
}

pub async fn block_expires(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:block");

    assert!(!store.is_blocked(&key).await.unwrap());

    store.block(&key, WINDOW).await.unwrap();
    assert!(store.is_blocked(&key).await.unwrap());

    tokio::time::sleep(PAST_WINDOW).await;
    assert!(!store.is_blocked(&key).await.unwrap());
    assert!(!store.is_blocked(&key).await.unwrap());
}

pub async fn block_overwrites_previous_block(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:overwrite");

    store.block(&key, Duration::from_secs(60)).await.unwrap();
    store.block(&key, WINDOW).await.unwrap();
    assert!(store.is_blocked(&key).await.unwrap());

    // The shorter block replaced the longer one instead of being merged with it
    tokio::time::sleep(PAST_WINDOW).await;
    assert!(!store.is_blocked(&key).await.unwrap());
}

pub async fn reset_forgets_key(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:reset");
    let window = Duration::from_secs(60);

    store.increment(&key, window).await.unwrap();
    store.increment(&key, window).await.unwrap();
    store.block(&key, Duration::from_secs(60)).await.unwrap();

    store.reset(&key).await.unwrap();
    assert!(!store.is_blocked(&key).await.unwrap());
    assert_eq!(store.increment(&key, window).await.unwrap(), 1);

    // Resetting a key that was never seen is not an error
    store.reset(&format!("{ns}:never-seen")).await.unwrap();
}

pub async fn keys_are_independent(store: Arc<dyn CounterStore>, ns: &str) {
    let first = format!("{ns}:first");
    let second = format!("{ns}:second");
    let window = Duration::from_secs(60);

    store.increment(&first, window).await.unwrap();
    store.increment(&first, window).await.unwrap();
    store.block(&first, Duration::from_secs(60)).await.unwrap();

    assert_eq!(store.increment(&second, window).await.unwrap(), 1);
    assert!(!store.is_blocked(&second).await.unwrap());
}

pub async fn concurrent_increments_are_not_lost(store: Arc<dyn CounterStore>, ns: &str) {
    const TASKS: u64 = 64;
    let key = format!("{ns}:concurrent");

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move { store.increment(&key, Duration::from_secs(60)).await })
        })
        .collect();

    let mut seen = BTreeSet::new();
    for result in futures::future::join_all(handles).await {
        let count = result.unwrap().unwrap();
        assert!(seen.insert(count), "count {} observed twice", count);
    }

    assert_eq!(seen, (1..=TASKS).collect::<BTreeSet<_>>());
}

pub async fn close_is_idempotent(store: Arc<dyn CounterStore>, ns: &str) {
    let key = format!("{ns}:close");

    store.increment(&key, Duration::from_secs(60)).await.unwrap();
    store.close().await.unwrap();
    store.close().await.unwrap();

    let err = store.increment(&key, Duration::from_secs(60)).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
    assert!(matches!(store.is_blocked(&key).await, Err(StoreError::Closed)));
}
