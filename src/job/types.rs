use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Header carrying the request id back to the client.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
/// Header naming the worker version that served the request.
pub const SERVED_BY_HEADER: &str = "X-Served-By";
/// Request header pinning dispatch to one worker version.
pub const WORKER_PIN_HEADER: &str = "X-Worker-Version";
/// Advisory handler deadline propagated to the worker, epoch milliseconds.
pub const JOB_DEADLINE_HEADER: &str = "X-Job-Deadline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Method {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(GateError::BadRequest(format!(
                "unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Expired
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::InProgress => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Expired => 2,
        }
    }

    /// Whether moving to `next` keeps the status sequence monotonic.
    /// `Expired` may be entered from any non-terminal state.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Expired => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Expired => write!(f, "expired"),
        }
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// One HTTP request and its eventual response, persisted as a single JSON
/// document in the shared store. Binary bodies are carried base64-encoded.
///
/// Header keys are matched case-insensitively via [`HttpJob::header`] while
/// the map preserves the case they arrived with for emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJob {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub target_worker: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(default, with = "base64_body")]
    pub response_body: Vec<u8>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HttpJob {
    pub fn new(
        request_id: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        query: HashMap<String, String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            method,
            path: path.into(),
            query,
            headers,
            body,
            target_worker: None,
            status: JobStatus::Pending,
            response_status: None,
            response_headers: HashMap::new(),
            response_body: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive request header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Moves to `next` if the transition is monotonic; returns whether the
    /// status changed.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.touch();
        true
    }

    /// Records the handler's response. A status below 400 completes the job;
    /// anything else marks it failed with the response preserved verbatim.
    pub fn set_response(
        &mut self,
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) {
        self.response_status = Some(status);
        self.response_headers = headers;
        self.response_body = body;
        if status < 400 {
            self.error = None;
            self.advance(JobStatus::Completed);
        } else {
            self.error = Some("handler_failure".to_string());
            self.advance(JobStatus::Failed);
        }
    }

    /// Marks the job failed with a short error tag and a JSON error body.
    pub fn fail(&mut self, tag: &str, status: u16) {
        let body = serde_json::json!({ "error": tag, "request_id": self.request_id });
        self.response_status = Some(status);
        self.response_headers = HashMap::from([(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]);
        self.response_body = serde_json::to_vec(&body).unwrap_or_default();
        self.error = Some(tag.to_string());
        self.advance(JobStatus::Failed);
    }

    /// Stamps the advisory handler deadline into the request headers,
    /// displacing any spelling of the header the client may have sent.
    pub fn set_deadline(&mut self, at: DateTime<Utc>) {
        self.headers
            .retain(|key, _| !key.eq_ignore_ascii_case(JOB_DEADLINE_HEADER));
        self.headers
            .insert(JOB_DEADLINE_HEADER.to_string(), at.timestamp_millis().to_string());
    }

    /// The advisory handler deadline, if one was stamped.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.header(JOB_DEADLINE_HEADER)?.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}
