//! In-process store implementation.
//!
//! [`MemoryStore`] implements the full [`Store`] capability set against
//! process-local state: DashMap shards for values, hashes, sets, and queues,
//! a `Notify` per queue for the blocking pop, and a `broadcast` channel per
//! pub/sub topic. TTLs are enforced lazily at read time.
//!
//! State is not shared across process boundaries, which makes this backend
//! suitable for tests and for single-process deployments where the gate hosts
//! its workers in-process.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Notify};

use super::{Store, Subscription};
use crate::error::{GateError, Result};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, ValueEntry>,
    hashes: DashMap<String, HashMap<String, String>>,
    sets: DashMap<String, BTreeSet<String>>,
    queues: DashMap<String, VecDeque<String>>,
    queue_signals: DashMap<String, Arc<Notify>>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop_front(&self, queue: &str) -> Option<String> {
        self.queues.get_mut(queue)?.pop_front()
    }

    fn queue_signal(&self, queue: &str) -> Arc<Notify> {
        self.queue_signals
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn queue_push(&self, queue: &str, item: &str) -> Result<()> {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(item.to_string());
        self.queue_signal(queue).notify_one();
        Ok(())
    }

    async fn queue_pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(item) = self.pop_front(queue) {
                return Ok(Some(item));
            }

            let signal = self.queue_signal(queue);
            let notified = signal.notified();
            tokio::pin!(notified);
            // Arm the waiter, then re-check so a push racing the registration
            // cannot be lost.
            notified.as_mut().enable();
            if let Some(item) = self.pop_front(queue) {
                return Ok(Some(item));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(deadline - now) => return Ok(None),
            }
        }
    }

    async fn queue_len(&self, queue: &str) -> Result<u64> {
        Ok(self.queues.get(queue).map(|q| q.len() as u64).unwrap_or(0))
    }

    async fn kv_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.values
            .insert(key.to_string(), ValueEntry::new(value, ttl));
        Ok(())
    }

    async fn kv_set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        match self.values.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().live() {
                    Ok(false)
                } else {
                    occupied.insert(ValueEntry::new(value, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ValueEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.values.get(key) {
            None => return Ok(None),
            Some(entry) => {
                if entry.live() {
                    return Ok(Some(entry.value.clone()));
                }
                true
            }
        };
        if expired {
            self.values.remove(key);
        }
        Ok(None)
    }

    async fn kv_delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .values
            .remove(key)
            .map(|(_, entry)| entry.live())
            .unwrap_or(false))
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_remove_field(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self
            .hashes
            .get_mut(key)
            .map(|mut hash| hash.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn atomic_increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| ValueEntry::new("0", None));
        if !entry.live() {
            *entry = ValueEntry::new("0", None);
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| GateError::Store(format!("key {} does not hold an integer", key)))?;
        let next = current + delta;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        // A send with no subscribers is not an error; the signal is advisory.
        let _ = self.channel(channel).send(message.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        Ok(Subscription::new(self.channel(channel).subscribe()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .get_mut(key)
            .map(|mut set| set.remove(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
