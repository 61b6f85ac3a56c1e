use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::types::Method;

/// One route advertisement: a worker version offering `(method, path)`.
///
/// `(method, path, worker_version)` is unique; several worker versions
/// advertising the same `(method, path)` form the candidate set for load
/// balancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub worker_version: String,
    pub registered_at: Option<DateTime<Utc>>,
    /// Taken from the worker's heartbeat key; absent once the heartbeat TTL
    /// has lapsed.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Splits a `METHOD|path` route id back into its parts. Returns `None` for
/// malformed ids (foreign keys in the index are skipped, not fatal).
pub fn split_route_id(route_id: &str) -> Option<(Method, String)> {
    let (method, path) = route_id.split_once('|')?;
    Some((Method::from_str(method).ok()?, path.to_string()))
}
