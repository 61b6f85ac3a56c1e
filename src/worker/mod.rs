//! Worker Module
//!
//! The execution side of the gateway. A worker process holds a set of typed
//! handlers, advertises one route per handler in the shared registry, and
//! then consumes its own queue: pop a request id, load the job, claim it,
//! run the handler, write the response back, and signal completion.
//!
//! ## Responsibilities
//! - **Registration**: explicit at startup — handlers are plain values
//!   collected in a [`registry::HandlerRegistry`] and iterated during
//!   bring-up, no import-time side effects.
//! - **Claiming**: the `pending -> in_progress` transition is a guarded
//!   compare-and-swap, so a job the gate already expired (or another consumer
//!   claimed) is dropped without running the handler.
//! - **Containment**: handler errors, panics, and deadline overruns are
//!   recorded on the job as failures; the loop itself survives them all.
//!   Only store unavailability beyond the retry budget is fatal.

pub mod demo;
pub mod registry;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use self::registry::{HandlerRegistry, HandlerResponse};
use crate::error::Result;
use crate::job::repository::{JobRepository, TransitionOutcome};
use crate::job::types::{HttpJob, JobStatus};
use crate::routing::registry::RouteRegistry;
use crate::store::{keys, with_retry, Store};

const QUEUE_POP_TIMEOUT: Duration = Duration::from_secs(1);
const STORE_RETRY_ATTEMPTS: usize = 5;

/// Fallback handler budget when a job carries no deadline header.
const DEFAULT_HANDLER_BUDGET: Duration = Duration::from_secs(30);

/// Slack granted past the advisory deadline before a running handler is
/// abandoned. Keeps the gate's own expiry ahead of the worker's, so a timed
/// out dispatch settles as expired rather than racing the failure write.
const HANDLER_DEADLINE_GRACE: Duration = Duration::from_secs(1);

enum HandlerOutcome {
    Response(HandlerResponse),
    Error(String),
    Panic,
    DeadlinePassed,
    NoHandler,
}

/// Long-running job consumer for one worker version.
pub struct AppWorker {
    version: String,
    store: Arc<dyn Store>,
    repository: JobRepository,
    registry: RouteRegistry,
    handlers: Arc<HandlerRegistry>,
    shutdown: CancellationToken,
}

impl AppWorker {
    pub fn new(
        version: impl Into<String>,
        store: Arc<dyn Store>,
        handlers: Arc<HandlerRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let repository = JobRepository::new(store.clone());
        let registry = RouteRegistry::new(store.clone());
        Self {
            version: version.into(),
            store,
            repository,
            registry,
            handlers,
            shutdown,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Advertises one route per registered handler and writes the first
    /// heartbeat. Safe to call more than once.
    pub async fn register_routes(&self) -> Result<usize> {
        let routes = self.handlers.routes();
        for (method, path) in &routes {
            self.registry.register(&self.version, *method, path).await?;
        }
        self.registry.heartbeat(&self.version, Utc::now()).await?;
        Ok(routes.len())
    }

    /// Runs the consume loop until the shutdown token fires, then finishes
    /// the in-flight job and deregisters every advertised route.
    ///
    /// Store failures are retried with capped backoff; exhausting the budget
    /// aborts the loop with the error (the binary exits non-zero).
    pub async fn run(&self) -> Result<()> {
        self.register_routes().await?;
        tracing::info!(version = %self.version, handlers = self.handlers.handler_count(), "Worker started");

        let queue = keys::queue(&self.version);
        loop {
            let popped = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                popped = with_retry(STORE_RETRY_ATTEMPTS, || {
                    self.store.queue_pop(&queue, QUEUE_POP_TIMEOUT)
                }) => popped?,
            };

            match popped {
                Some(request_id) => self.process(&request_id).await?,
                None => {
                    with_retry(STORE_RETRY_ATTEMPTS, || {
                        self.registry.heartbeat(&self.version, Utc::now())
                    })
                    .await?;
                }
            }
        }

        self.registry.deregister(&self.version).await?;
        tracing::info!(version = %self.version, "Worker stopped");
        Ok(())
    }

    /// Handles one popped request id end to end. Job-level failures are
    /// recorded on the job; only store failures propagate.
    async fn process(&self, request_id: &str) -> Result<()> {
        let Some(job) = self.repository.get(request_id).await? else {
            tracing::debug!(request_id, "Job missing on pop, skipping");
            return Ok(());
        };
        if job.status == JobStatus::Expired {
            tracing::debug!(request_id, "Job already expired, skipping");
            return Ok(());
        }

        match self
            .repository
            .transition(request_id, JobStatus::Pending, JobStatus::InProgress)
            .await?
        {
            TransitionOutcome::Applied => {}
            TransitionOutcome::StateMismatch { actual } => {
                tracing::debug!(request_id, status = %actual, "Job not pending, skipping");
                return Ok(());
            }
            TransitionOutcome::NotFound => return Ok(()),
        }

        let Some(mut job) = self.repository.get(request_id).await? else {
            return Ok(());
        };

        match self.run_handler(&job).await {
            HandlerOutcome::Response(response) => {
                tracing::info!(request_id, status = response.status, "Handler finished");
                job.set_response(response.status, response.headers, response.body);
            }
            HandlerOutcome::Error(message) => {
                tracing::warn!(request_id, error = %message, "Handler failed");
                job.fail("handler_error", 500);
            }
            HandlerOutcome::Panic => {
                tracing::error!(request_id, "Handler panicked");
                job.fail("handler_panic", 500);
            }
            HandlerOutcome::DeadlinePassed => {
                tracing::warn!(request_id, "Handler abandoned past its deadline");
                job.fail("handler_timeout", 500);
            }
            HandlerOutcome::NoHandler => {
                tracing::warn!(request_id, method = %job.method, path = %job.path, "No handler for advertised route");
                job.fail("no_handler", 500);
            }
        }

        if self.repository.finish(&job).await? {
            self.store
                .publish(&keys::done_channel(request_id), request_id)
                .await?;
        } else {
            tracing::debug!(request_id, "Job finished elsewhere, dropping result");
        }
        Ok(())
    }

    /// Runs the matching handler on its own task, bounded by the remaining
    /// deadline budget. The spawned task isolates panics; enforcement of the
    /// deadline is best-effort via abort.
    async fn run_handler(&self, job: &HttpJob) -> HandlerOutcome {
        let Some(handler) = self.handlers.get(job.method, &job.path) else {
            return HandlerOutcome::NoHandler;
        };

        let remaining = job
            .deadline()
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO));
        let budget = match remaining {
            Some(remaining) if remaining.is_zero() => return HandlerOutcome::DeadlinePassed,
            Some(remaining) => remaining + HANDLER_DEADLINE_GRACE,
            None => DEFAULT_HANDLER_BUDGET,
        };

        let job = job.clone();
        let mut task = tokio::spawn(async move { handler(job).await });

        match tokio::time::timeout(budget, &mut task).await {
            Err(_) => {
                task.abort();
                HandlerOutcome::DeadlinePassed
            }
            Ok(Ok(Ok(response))) => HandlerOutcome::Response(response),
            Ok(Ok(Err(e))) => HandlerOutcome::Error(e.to_string()),
            Ok(Err(join_error)) if join_error.is_panic() => HandlerOutcome::Panic,
            Ok(Err(_)) => HandlerOutcome::Error("handler task cancelled".to_string()),
        }
    }
}
