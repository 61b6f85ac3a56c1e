//! Store-level mutex.
//!
//! A [`StoreLock`] serializes short critical sections across processes using
//! atomic set-if-absent with a TTL: only one holder can create the lock key,
//! and the TTL bounds how long a crashed holder can wedge the resource. Each
//! lock instance carries a unique holder id so release never removes someone
//! else's acquisition.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::Store;
use crate::error::Result;

/// Default lock TTL. Registration critical sections are a handful of store
/// round-trips, so expiry only matters when a holder dies mid-section.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(2);

const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct StoreLock {
    store: Arc<dyn Store>,
    key: String,
    holder_id: String,
    ttl: Duration,
}

impl StoreLock {
    pub fn new(store: Arc<dyn Store>, key: String) -> Self {
        Self::with_ttl(store, key, DEFAULT_LOCK_TTL)
    }

    pub fn with_ttl(store: Arc<dyn Store>, key: String, ttl: Duration) -> Self {
        Self {
            store,
            key,
            holder_id: Uuid::new_v4().to_string(),
            ttl,
        }
    }

    /// Tries to take the lock, retrying up to `retries` extra times with a
    /// short delay. Returns whether the lock was acquired.
    pub async fn acquire(&self, retries: usize) -> Result<bool> {
        for attempt in 0..=retries {
            if self
                .store
                .kv_set_nx(&self.key, &self.holder_id, Some(self.ttl))
                .await?
            {
                tracing::trace!(key = %self.key, "Lock acquired");
                return Ok(true);
            }
            if attempt < retries {
                tokio::time::sleep(ACQUIRE_RETRY_DELAY).await;
            }
        }

        tracing::debug!(key = %self.key, "Lock acquisition failed");
        Ok(false)
    }

    /// Releases the lock if this instance still holds it. Returns whether the
    /// key was removed; a lock that expired and was re-acquired elsewhere is
    /// left alone.
    pub async fn release(&self) -> Result<bool> {
        match self.store.kv_get(&self.key).await? {
            Some(holder) if holder == self.holder_id => self.store.kv_delete(&self.key).await,
            _ => {
                tracing::debug!(key = %self.key, "Not the lock holder, skipping release");
                Ok(false)
            }
        }
    }
}
