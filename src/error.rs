use std::time::Duration;

use thiserror::Error;

/// Errors observed at the gateway boundary.
///
/// Every variant has a total mapping to an HTTP status and a short error tag;
/// internal store errors are logged in full server-side but never surfaced
/// verbatim to clients.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("no route registered for {method} {path}")]
    NoRoute { method: String, path: String },

    #[error("no worker available for {method} {path}")]
    NoCandidate { method: String, path: String },

    #[error("dispatch timed out after {0:?}")]
    DispatchTimeout(Duration),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GateError {
    /// HTTP status code this error maps to at the ingress.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::NoRoute { .. } => 404,
            GateError::NoCandidate { .. } => 503,
            GateError::DispatchTimeout(_) => 504,
            GateError::JobNotFound(_) => 404,
            GateError::BadRequest(_) => 400,
            GateError::Store(_) | GateError::Serde(_) => 502,
        }
    }

    /// Short machine-readable tag used in JSON error bodies.
    pub fn tag(&self) -> &'static str {
        match self {
            GateError::NoRoute { .. } => "no_route",
            GateError::NoCandidate { .. } => "no_candidate",
            GateError::DispatchTimeout(_) => "dispatch_timeout",
            GateError::JobNotFound(_) => "not_found",
            GateError::BadRequest(_) => "bad_request",
            GateError::Store(_) | GateError::Serde(_) => "store_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
