use std::sync::Arc;
use std::time::Duration;

use super::types::{HttpJob, JobStatus};
use crate::error::{GateError, Result};
use crate::store::lock::StoreLock;
use crate::store::{keys, Store};

/// Default job TTL: a job disappears from the store five minutes after
/// creation unless deleted earlier.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(300);

const TRANSITION_LOCK_RETRIES: usize = 5;

/// Outcome of a guarded state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    StateMismatch { actual: JobStatus },
    NotFound,
}

/// Persists [`HttpJob`]s in the shared store keyed by request id.
///
/// Each job is one JSON document under `httpjob:<request_id>`; the TTL counts
/// from creation, so updates re-persist with the remaining budget rather than
/// resetting the clock.
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl JobRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_ttl(store, DEFAULT_JOB_TTL)
    }

    pub fn with_ttl(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn save(&self, job: &HttpJob) -> Result<()> {
        let document = serde_json::to_string(job)?;
        self.store
            .kv_set(&keys::job(&job.request_id), &document, Some(self.remaining_ttl(job)))
            .await
    }

    pub async fn get(&self, request_id: &str) -> Result<Option<HttpJob>> {
        match self.store.kv_get(&keys::job(request_id)).await? {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, request_id: &str) -> Result<bool> {
        Ok(self.store.kv_get(&keys::job(request_id)).await?.is_some())
    }

    pub async fn delete(&self, request_id: &str) -> Result<bool> {
        self.store.kv_delete(&keys::job(request_id)).await
    }

    /// Atomically moves the job from `expected` to `target`.
    ///
    /// The read-check-write runs under a short store-level lock so concurrent
    /// claimants (a worker starting the job versus the gate expiring it)
    /// cannot both win.
    pub async fn transition(
        &self,
        request_id: &str,
        expected: JobStatus,
        target: JobStatus,
    ) -> Result<TransitionOutcome> {
        let lock = StoreLock::new(self.store.clone(), keys::job_lock(request_id));
        if !lock.acquire(TRANSITION_LOCK_RETRIES).await? {
            return Err(GateError::Store(format!(
                "could not lock job {} for transition",
                request_id
            )));
        }

        let outcome = self.transition_locked(request_id, expected, target).await;
        let _ = lock.release().await;
        outcome
    }

    async fn transition_locked(
        &self,
        request_id: &str,
        expected: JobStatus,
        target: JobStatus,
    ) -> Result<TransitionOutcome> {
        let Some(mut job) = self.get(request_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if job.status != expected {
            return Ok(TransitionOutcome::StateMismatch { actual: job.status });
        }
        if !job.advance(target) {
            return Ok(TransitionOutcome::StateMismatch { actual: job.status });
        }
        self.save(&job).await?;
        Ok(TransitionOutcome::Applied)
    }

    /// Writes a finished job back, unless the stored copy already reached a
    /// terminal state (the gate may have expired it mid-handler). Returns
    /// whether the result was recorded.
    pub async fn finish(&self, job: &HttpJob) -> Result<bool> {
        let lock = StoreLock::new(self.store.clone(), keys::job_lock(&job.request_id));
        if !lock.acquire(TRANSITION_LOCK_RETRIES).await? {
            return Err(GateError::Store(format!(
                "could not lock job {} for completion",
                job.request_id
            )));
        }

        let result = async {
            match self.get(&job.request_id).await? {
                None => Ok(false),
                Some(current) if current.status.is_terminal() => Ok(false),
                Some(_) => {
                    self.save(job).await?;
                    Ok(true)
                }
            }
        }
        .await;

        let _ = lock.release().await;
        result
    }

    /// Expires the job from whatever non-terminal state it is in. Returns
    /// whether the job was actually expired.
    pub async fn expire(&self, request_id: &str) -> Result<bool> {
        let lock = StoreLock::new(self.store.clone(), keys::job_lock(request_id));
        if !lock.acquire(TRANSITION_LOCK_RETRIES).await? {
            return Err(GateError::Store(format!(
                "could not lock job {} for expiry",
                request_id
            )));
        }

        let result = async {
            let Some(mut job) = self.get(request_id).await? else {
                return Ok(false);
            };
            if !job.advance(JobStatus::Expired) {
                return Ok(false);
            }
            self.save(&job).await?;
            Ok(true)
        }
        .await;

        let _ = lock.release().await;
        result
    }

    /// Depth of a worker version's queue.
    pub async fn queue_len(&self, worker_version: &str) -> Result<u64> {
        self.store.queue_len(&keys::queue(worker_version)).await
    }

    fn remaining_ttl(&self, job: &HttpJob) -> Duration {
        let elapsed = (chrono::Utc::now() - job.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.ttl.saturating_sub(elapsed).max(Duration::from_secs(1))
    }
}
