//! Worker Module Tests
//!
//! Runs a live worker loop against the in-process store and checks the
//! claim-execute-complete protocol, failure containment (handler errors and
//! panics become failed jobs, the loop survives), expiry skipping, and
//! graceful shutdown with deregistration.

#[cfg(test)]
mod tests {
    use crate::job::repository::JobRepository;
    use crate::job::types::{HttpJob, JobStatus, Method};
    use crate::routing::registry::RouteRegistry;
    use crate::store::memory::MemoryStore;
    use crate::store::{keys, Store};
    use crate::worker::registry::{HandlerRegistry, HandlerResponse};
    use crate::worker::AppWorker;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    fn test_handlers() -> Arc<HandlerRegistry> {
        let handlers = HandlerRegistry::new();
        handlers.register(Method::Post, "/echo", |job: HttpJob| async move {
            Ok(HandlerResponse::json(
                200,
                &serde_json::json!({ "bytes": job.body.len() }),
            ))
        });
        handlers.register(Method::Get, "/fail", |_job| async {
            anyhow::bail!("intentional error")
        });
        handlers.register(Method::Get, "/panic", |_job| async {
            panic!("intentional panic")
        });
        handlers.register(Method::Get, "/teapot", |_job| async {
            Ok(HandlerResponse::json(418, &serde_json::json!({ "short": "stout" })))
        });
        handlers
    }

    struct Harness {
        store: Arc<dyn Store>,
        repository: JobRepository,
        shutdown: CancellationToken,
        worker: JoinHandle<crate::error::Result<()>>,
    }

    async fn start_worker(version: &str) -> Harness {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let repository = JobRepository::new(store.clone());
        let shutdown = CancellationToken::new();
        let worker = AppWorker::new(version, store.clone(), test_handlers(), shutdown.clone());
        worker.register_routes().await.unwrap();
        let worker = tokio::spawn(async move { worker.run().await });
        Harness {
            store,
            repository,
            shutdown,
            worker,
        }
    }

    async fn submit(harness: &Harness, version: &str, job: &HttpJob) {
        harness.repository.save(job).await.unwrap();
        harness
            .store
            .queue_push(&keys::queue(version), &job.request_id)
            .await
            .unwrap();
    }

    async fn await_terminal(harness: &Harness, request_id: &str) -> HttpJob {
        for _ in 0..200 {
            let job = harness.repository.get(request_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", request_id);
    }

    fn job(request_id: &str, method: Method, path: &str, body: &[u8]) -> HttpJob {
        HttpJob::new(
            request_id,
            method,
            path,
            HashMap::new(),
            HashMap::new(),
            body.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_worker_completes_job_and_signals() {
        let harness = start_worker("v1").await;
        let mut done = harness
            .store
            .subscribe(&keys::done_channel("w1"))
            .await
            .unwrap();

        submit(&harness, "v1", &job("w1", Method::Post, "/echo", b"hello")).await;

        let signal = tokio::time::timeout(Duration::from_secs(2), done.recv())
            .await
            .unwrap();
        assert_eq!(signal.as_deref(), Some("w1"));

        let finished = await_terminal(&harness, "w1").await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.response_status, Some(200));
        let body: serde_json::Value = serde_json::from_slice(&finished.response_body).unwrap();
        assert_eq!(body["bytes"], 5);

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_fails_job_but_loop_survives() {
        let harness = start_worker("v1").await;

        submit(&harness, "v1", &job("w2", Method::Get, "/fail", b"")).await;
        let failed = await_terminal(&harness, "w2").await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("handler_error"));
        assert_eq!(failed.response_status, Some(500));

        // The loop is still alive and serves the next job.
        submit(&harness, "v1", &job("w3", Method::Post, "/echo", b"x")).await;
        let ok = await_terminal(&harness, "w3").await;
        assert_eq!(ok.status, JobStatus::Completed);

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let harness = start_worker("v1").await;

        submit(&harness, "v1", &job("w4", Method::Get, "/panic", b"")).await;
        let failed = await_terminal(&harness, "w4").await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("handler_panic"));

        submit(&harness, "v1", &job("w5", Method::Post, "/echo", b"x")).await;
        assert_eq!(
            await_terminal(&harness, "w5").await.status,
            JobStatus::Completed
        );

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_chosen_status_is_preserved() {
        let harness = start_worker("v1").await;

        submit(&harness, "v1", &job("w6", Method::Get, "/teapot", b"")).await;
        let job = await_terminal(&harness, "w6").await;
        assert_eq!(job.response_status, Some(418));
        assert_eq!(job.status, JobStatus::Failed);
        let body: serde_json::Value = serde_json::from_slice(&job.response_body).unwrap();
        assert_eq!(body["short"], "stout");

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_expired_job_is_skipped_silently() {
        let harness = start_worker("v1").await;

        let mut expired = job("w7", Method::Post, "/echo", b"late");
        expired.advance(JobStatus::Expired);
        submit(&harness, "v1", &expired).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let untouched = harness.repository.get("w7").await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Expired);
        assert!(untouched.response_status.is_none());

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stale_deadline_abandons_handler() {
        let harness = start_worker("v1").await;

        let mut late = job("w8", Method::Post, "/echo", b"x");
        late.set_deadline(chrono::Utc::now() - chrono::Duration::seconds(1));
        submit(&harness, "v1", &late).await;

        let failed = await_terminal(&harness, "w8").await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("handler_timeout"));

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_deregisters_routes() {
        let harness = start_worker("v1").await;
        let registry = RouteRegistry::new(harness.store.clone());

        assert!(!registry.list_all().await.unwrap().is_empty());

        harness.shutdown.cancel();
        harness.worker.await.unwrap().unwrap();

        assert!(registry.list_all().await.unwrap().is_empty());
        assert!(registry
            .candidates(Method::Post, "/echo")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_registry_bookkeeping() {
        let handlers = test_handlers();
        assert_eq!(handlers.handler_count(), 4);
        assert!(handlers.has_handler(Method::Post, "/echo"));
        assert!(!handlers.has_handler(Method::Get, "/echo"));
        assert!(handlers.get(Method::Get, "/fail").is_some());

        let routes = handlers.routes();
        assert_eq!(routes.len(), 4);
        assert!(routes.contains(&(Method::Post, "/echo".to_string())));
    }
}
