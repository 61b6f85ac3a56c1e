//! Store Key Schema
//!
//! All coordination state lives under these keys, `:`-separated. Routes are
//! identified by a `METHOD|path` pair so the route id can double as a set
//! member and a key fragment.

/// Set of all registered `METHOD|path` route ids.
pub const ROUTES_INDEX: &str = "routes:index";

/// Joins a method and a path into the canonical route id.
pub fn route_id(method: &str, path: &str) -> String {
    format!("{}|{}", method, path)
}

/// JSON HttpJob document, TTL-bound.
pub fn job(request_id: &str) -> String {
    format!("httpjob:{}", request_id)
}

/// Short-lived mutex guarding a job's state transitions.
pub fn job_lock(request_id: &str) -> String {
    format!("httpjob:lock:{}", request_id)
}

/// FIFO inbox of request ids for one worker version.
pub fn queue(worker_version: &str) -> String {
    format!("queue:{}", worker_version)
}

/// Set of worker versions offering the route (the candidate set).
pub fn route_members(route_id: &str) -> String {
    format!("routes:{}", route_id)
}

/// Hash of worker version to first-registration timestamp for the route.
pub fn route_meta(route_id: &str) -> String {
    format!("routes:meta:{}", route_id)
}

/// Reverse index: set of route ids one worker version registered.
pub fn worker_routes(worker_version: &str) -> String {
    format!("routes:worker:{}", worker_version)
}

/// Round-robin cursor for the route.
pub fn route_cursor(route_id: &str) -> String {
    format!("route:cursor:{}", route_id)
}

/// Short-lived mutex serializing registration writes for the route.
pub fn route_lock(route_id: &str) -> String {
    format!("route:lock:{}", route_id)
}

/// Pub/sub channel signalling a job's completion. Nothing is stored here.
pub fn done_channel(request_id: &str) -> String {
    format!("jobdone:{}", request_id)
}

/// Worker liveness timestamp, refreshed on every idle tick.
pub fn heartbeat(worker_version: &str) -> String {
    format!("heartbeat:{}", worker_version)
}
