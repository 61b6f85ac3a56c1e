//! Shared-Store Access Layer
//!
//! Every component of the gateway coordinates through one shared data store
//! reachable over outbound connections from both sides. This module defines
//! the capability set as the [`Store`] trait; the store itself is an external
//! collaborator and only its contract lives here.
//!
//! ## Capabilities
//! - **Queues**: FIFO lists with a bounded blocking pop (worker inboxes).
//! - **Key/value**: plain entries with optional TTL, plus atomic
//!   set-if-absent, the primitive behind [`lock::StoreLock`].
//! - **Hashes and sets**: field maps and membership sets backing the route
//!   registry indexes.
//! - **Counters**: atomic increments for round-robin cursors.
//! - **Pub/sub**: completion signals; subscribing before the triggering write
//!   must not miss messages.
//!
//! The in-process [`memory::MemoryStore`] backs tests, development, and
//! single-process deployments. A networked client (a Redis wrapper, say)
//! would implement the same trait and slot in via [`connect`].

pub mod keys;
pub mod lock;
pub mod memory;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::StoreConfig;
use crate::error::{GateError, Result};

/// Receiving side of a [`Store::subscribe`] call.
pub struct Subscription {
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Next message on the channel, or `None` once the channel is closed.
    /// A lagged receiver skips the overwritten backlog and keeps going.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Uniform access to queues, key/value state, and atomic primitives on the
/// shared store. All operations are safe to call from concurrent tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends `item` to the tail of the named queue.
    async fn queue_push(&self, queue: &str, item: &str) -> Result<()>;

    /// Pops the head of the named queue, waiting up to `timeout` for an item.
    async fn queue_pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>>;

    /// Current depth of the named queue.
    async fn queue_len(&self, queue: &str) -> Result<u64>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn kv_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Stores `value` under `key` only if the key is absent. Returns whether
    /// the write happened. This is the lock primitive.
    async fn kv_set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    async fn kv_get(&self, key: &str) -> Result<Option<String>>;

    /// Removes `key`; returns whether a live entry was removed.
    async fn kv_delete(&self, key: &str) -> Result<bool>;

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hash_remove_field(&self, key: &str, field: &str) -> Result<bool>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Adds `delta` to the integer stored at `key` (missing keys count from
    /// zero) and returns the new value.
    async fn atomic_increment(&self, key: &str, delta: i64) -> Result<i64>;

    /// Fire-and-forget broadcast; messages are not stored.
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    /// Adds `member` to the named set; returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}

/// Opens the store described by `config`.
///
/// The built-in backend is the in-process [`memory::MemoryStore`], which
/// serves single-process deployments (gate plus `--local-worker`) and tests.
/// The `STORE_*` connection settings apply once a networked `Store`
/// implementation is wired in here.
pub fn connect(config: &StoreConfig) -> Arc<dyn Store> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        db = config.db,
        tls = config.use_tls,
        "Using in-process store; STORE_* settings apply to networked store clients"
    );
    Arc::new(memory::MemoryStore::new())
}

/// Runs a fallible store operation, retrying transient failures a bounded
/// number of times with capped exponential backoff and jitter.
pub async fn with_retry<T, F, Fut>(attempts: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay_ms = 150u64;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(e);
                }
                tracing::warn!("Store operation failed (attempt {}): {}", attempt + 1, e);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(GateError::Store("retry attempts exhausted".to_string()))
}
