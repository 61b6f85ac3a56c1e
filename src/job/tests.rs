//! Job Module Tests
//!
//! Covers the status machine (monotonic transitions, expiry from any
//! non-terminal state), the JSON document encoding with base64 bodies, and
//! the repository's guarded compare-and-swap.

#[cfg(test)]
mod tests {
    use crate::job::repository::{JobRepository, TransitionOutcome};
    use crate::job::types::{HttpJob, JobStatus, Method, JOB_DEADLINE_HEADER};
    use crate::store::memory::MemoryStore;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_job(request_id: &str) -> HttpJob {
        HttpJob::new(
            request_id,
            Method::Post,
            "/api/counter/increment",
            HashMap::new(),
            HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            br#"{"name":"visitors","amount":1}"#.to_vec(),
        )
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::from_str("get").unwrap(), Method::Get);
        assert_eq!(Method::from_str("POST").unwrap(), Method::Post);
        assert!(Method::from_str("TRACE").is_err());
    }

    #[test]
    fn test_status_sequence_is_monotonic() {
        let mut job = sample_job("j1");

        assert!(job.advance(JobStatus::InProgress));
        assert!(job.advance(JobStatus::Completed));

        // Terminal states never regress.
        assert!(!job.advance(JobStatus::Pending));
        assert!(!job.advance(JobStatus::InProgress));
        assert!(!job.advance(JobStatus::Expired));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_expired_wins_from_any_non_terminal_state() {
        let mut pending = sample_job("j2");
        assert!(pending.advance(JobStatus::Expired));

        let mut in_progress = sample_job("j3");
        in_progress.advance(JobStatus::InProgress);
        assert!(in_progress.advance(JobStatus::Expired));

        let mut failed = sample_job("j4");
        failed.fail("handler_error", 500);
        assert!(!failed.advance(JobStatus::Expired));
        assert_eq!(failed.status, JobStatus::Failed);
    }

    #[test]
    fn test_set_response_maps_status_to_outcome() {
        let mut ok = sample_job("j5");
        ok.advance(JobStatus::InProgress);
        ok.set_response(200, HashMap::new(), b"ok".to_vec());
        assert_eq!(ok.status, JobStatus::Completed);
        assert!(ok.error.is_none());

        let mut rejected = sample_job("j6");
        rejected.advance(JobStatus::InProgress);
        rejected.set_response(422, HashMap::new(), b"nope".to_vec());
        assert_eq!(rejected.status, JobStatus::Failed);
        assert_eq!(rejected.error.as_deref(), Some("handler_failure"));
        assert_eq!(rejected.response_status, Some(422));
        assert_eq!(rejected.response_body, b"nope".to_vec());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let job = sample_job("j7");

        assert_eq!(job.header("content-type").unwrap(), "application/json");
        assert_eq!(job.header("CONTENT-TYPE").unwrap(), "application/json");
        assert!(job.header("X-Missing").is_none());
        // Original case survives in the map itself.
        assert!(job.headers.contains_key("Content-Type"));
    }

    #[test]
    fn test_deadline_round_trip() {
        let mut job = sample_job("j8");
        assert!(job.deadline().is_none());

        let at = chrono::Utc::now() + chrono::Duration::seconds(30);
        job.set_deadline(at);

        let parsed = job.deadline().unwrap();
        assert_eq!(parsed.timestamp_millis(), at.timestamp_millis());
        assert!(job.header(JOB_DEADLINE_HEADER).is_some());
    }

    #[test]
    fn test_document_encoding_keeps_binary_body() {
        let mut job = sample_job("j9");
        job.body = vec![0x00, 0xff, 0x80, 0x7f];
        job.set_deadline(chrono::Utc::now());

        let document = serde_json::to_string(&job).unwrap();
        // Raw bytes must not leak into the JSON document.
        assert!(document.contains("\"body\":\"AP+Afw==\""));

        let restored: HttpJob = serde_json::from_str(&document).unwrap();
        assert_eq!(restored.body, job.body);
        assert_eq!(restored.status, JobStatus::Pending);
        assert_eq!(restored.method, Method::Post);
    }

    #[tokio::test]
    async fn test_repository_save_get_delete() {
        let repository = JobRepository::new(Arc::new(MemoryStore::new()));
        let job = sample_job("r1");

        assert!(repository.get("r1").await.unwrap().is_none());
        repository.save(&job).await.unwrap();

        assert!(repository.exists("r1").await.unwrap());
        let loaded = repository.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded.request_id, "r1");
        assert_eq!(loaded.path, "/api/counter/increment");

        assert!(repository.delete("r1").await.unwrap());
        assert!(!repository.exists("r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_repository_ttl_reaps_job() {
        let repository =
            JobRepository::with_ttl(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let mut job = sample_job("r2");
        // Backdate creation so the remaining budget is the floor.
        job.created_at = chrono::Utc::now() - chrono::Duration::seconds(30);

        repository.save(&job).await.unwrap();
        assert!(repository.exists("r2").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(repository.get("r2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let repository = JobRepository::new(Arc::new(MemoryStore::new()));
        repository.save(&sample_job("r3")).await.unwrap();

        let first = repository
            .transition("r3", JobStatus::Pending, JobStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(first, TransitionOutcome::Applied);

        let second = repository
            .transition("r3", JobStatus::Pending, JobStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(
            second,
            TransitionOutcome::StateMismatch {
                actual: JobStatus::InProgress
            }
        );
    }

    #[tokio::test]
    async fn test_transition_missing_job() {
        let repository = JobRepository::new(Arc::new(MemoryStore::new()));

        let outcome = repository
            .transition("ghost", JobStatus::Pending, JobStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_expire_skips_terminal_jobs() {
        let repository = JobRepository::new(Arc::new(MemoryStore::new()));

        let mut done = sample_job("r4");
        done.advance(JobStatus::InProgress);
        done.set_response(200, HashMap::new(), Vec::new());
        repository.save(&done).await.unwrap();
        assert!(!repository.expire("r4").await.unwrap());

        repository.save(&sample_job("r5")).await.unwrap();
        assert!(repository.expire("r5").await.unwrap());
        let expired = repository.get("r5").await.unwrap().unwrap();
        assert_eq!(expired.status, JobStatus::Expired);
    }
}
