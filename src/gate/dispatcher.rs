use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::error::{GateError, Result};
use crate::job::repository::JobRepository;
use crate::job::types::{HttpJob, JobStatus, Method, WORKER_PIN_HEADER};
use crate::routing::registry::RouteRegistry;
use crate::routing::strategy::RouteStrategy;
use crate::store::{keys, Store, Subscription};

pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a job may sit `pending` before the gate assumes the chosen worker
/// is dead and moves the job to another candidate (once).
pub const DEFAULT_STUCK_AFTER: Duration = Duration::from_secs(5);

const POLL_INITIAL: Duration = Duration::from_millis(20);
const POLL_MAX: Duration = Duration::from_millis(200);

/// Gate-side dispatcher: creates a job, queues it for the selected worker,
/// and awaits its completion.
///
/// Dispatch never retries transparently; a caller retry is a fresh call with
/// a fresh request id. The gate does not deduplicate.
#[derive(Clone)]
pub struct JobDispatcher {
    store: Arc<dyn Store>,
    repository: JobRepository,
    registry: RouteRegistry,
    strategy: RouteStrategy,
    timeout: Duration,
    stuck_after: Duration,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        repository: JobRepository,
        registry: RouteRegistry,
        strategy: RouteStrategy,
    ) -> Self {
        Self {
            store,
            repository,
            registry,
            strategy,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
            stuck_after: DEFAULT_STUCK_AFTER,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stuck_after(mut self, stuck_after: Duration) -> Self {
        self.stuck_after = stuck_after;
        self
    }

    /// Runs one request through the gateway. `request_id` is assigned by the
    /// ingress and is also the id recorded on the persisted job.
    ///
    /// Returns the job in its terminal state; the caller emits its response
    /// verbatim. Cancellation of this future (client disconnect) expires the
    /// job in the background.
    pub async fn dispatch(
        &self,
        request_id: &str,
        method: Method,
        path: &str,
        query: HashMap<String, String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Result<HttpJob> {
        let candidates = self.registry.candidates(method, path).await?;
        if candidates.is_empty() {
            return Err(GateError::NoRoute {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        let mut job = HttpJob::new(request_id, method, path, query, headers, body);
        let pinned = job.header(WORKER_PIN_HEADER).map(str::to_owned);

        let Some(target) = self
            .strategy
            .select(method, path, &candidates, pinned.as_deref())
            .await?
        else {
            return Err(GateError::NoCandidate {
                method: method.to_string(),
                path: path.to_string(),
            });
        };

        job.target_worker = Some(target.clone());
        let deadline_budget =
            chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::zero());
        job.set_deadline(Utc::now() + deadline_budget);
        self.repository.save(&job).await?;

        // Subscribe before the push so a completion signal racing the wait
        // loop cannot be missed.
        let done = self.store.subscribe(&keys::done_channel(request_id)).await?;
        self.store
            .queue_push(&keys::queue(&target), request_id)
            .await?;
        tracing::info!(request_id, worker = %target, method = %method, path, "Job dispatched");

        let mut guard = ExpireOnDrop::new(self.repository.clone(), request_id.to_string());
        let result = self
            .await_completion(request_id, done, method, path, &candidates, &target, pinned.as_deref())
            .await;
        guard.disarm();
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn await_completion(
        &self,
        request_id: &str,
        mut done: Subscription,
        method: Method,
        path: &str,
        candidates: &[String],
        target: &str,
        pinned: Option<&str>,
    ) -> Result<HttpJob> {
        let started = Instant::now();
        let mut poll_wait = POLL_INITIAL;
        let mut target = target.to_string();
        let mut redispatched = false;

        loop {
            match self.repository.get(request_id).await? {
                None => {
                    // The TTL reaped the job mid-wait; nothing left to return.
                    tracing::error!(request_id, "Job disappeared from the store while waiting");
                    return Err(GateError::Store(format!(
                        "job {} disappeared while awaiting completion",
                        request_id
                    )));
                }
                Some(job) if job.status == JobStatus::Expired => {
                    return Err(GateError::DispatchTimeout(self.timeout));
                }
                Some(job) if job.status.is_terminal() => return Ok(job),
                Some(job) => {
                    if !redispatched
                        && job.status == JobStatus::Pending
                        && started.elapsed() >= self.stuck_after
                    {
                        redispatched = true;
                        if let Some(next) = self
                            .redispatch(request_id, method, path, candidates, &target, pinned)
                            .await?
                        {
                            target = next;
                        }
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                self.repository.expire(request_id).await?;
                tracing::warn!(request_id, timeout = ?self.timeout, "Dispatch deadline exceeded");
                return Err(GateError::DispatchTimeout(self.timeout));
            }

            let wait = poll_wait.min(self.timeout - elapsed);
            tokio::select! {
                // Completion signal: the terminal state is visible on the
                // next repository read.
                _ = done.recv() => {}
                _ = tokio::time::sleep(wait) => {
                    poll_wait = (poll_wait * 2).min(POLL_MAX);
                }
            }
        }
    }

    /// One-shot fallback for a worker that never picked the job up: evict it
    /// from the candidate set for this request and queue the job elsewhere.
    /// The original queue entry cannot be retracted; the state transition
    /// guard keeps both workers from running the handler.
    async fn redispatch(
        &self,
        request_id: &str,
        method: Method,
        path: &str,
        candidates: &[String],
        exclude: &str,
        pinned: Option<&str>,
    ) -> Result<Option<String>> {
        let remaining: Vec<String> = candidates
            .iter()
            .filter(|v| v.as_str() != exclude)
            .cloned()
            .collect();
        let Some(next) = self.strategy.select(method, path, &remaining, pinned).await? else {
            tracing::warn!(request_id, stuck_on = exclude, "Job stuck pending, no other candidate");
            return Ok(None);
        };

        if let Some(mut job) = self.repository.get(request_id).await? {
            if job.status != JobStatus::Pending {
                return Ok(None);
            }
            job.target_worker = Some(next.clone());
            job.touch();
            self.repository.save(&job).await?;
        }

        self.store.queue_push(&keys::queue(&next), request_id).await?;
        tracing::warn!(request_id, from = exclude, to = %next, "Job stuck pending, redispatched");
        Ok(Some(next))
    }
}

/// Expires the job if the dispatch future is dropped before it resolves
/// (client disconnect). The cleanup runs on a spawned task since `Drop`
/// cannot await.
struct ExpireOnDrop {
    repository: JobRepository,
    request_id: String,
    armed: bool,
}

impl ExpireOnDrop {
    fn new(repository: JobRepository, request_id: String) -> Self {
        Self {
            repository,
            request_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExpireOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let repository = self.repository.clone();
        let request_id = std::mem::take(&mut self.request_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tracing::debug!(request_id = %request_id, "Dispatch cancelled, expiring job");
                if let Err(e) = repository.expire(&request_id).await {
                    tracing::warn!(request_id = %request_id, "Failed to expire cancelled job: {}", e);
                }
            });
        }
    }
}
