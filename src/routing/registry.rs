use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::{split_route_id, Route};
use crate::error::{GateError, Result};
use crate::job::types::Method;
use crate::store::lock::StoreLock;
use crate::store::{keys, Store};

/// Heartbeat TTL: a worker that stops ticking disappears from liveness views
/// after this long.
pub const HEARTBEAT_TTL: Duration = Duration::from_secs(30);

const REGISTRATION_LOCK_RETRIES: usize = 10;

/// Durable route registry persisted in the shared store.
///
/// Concurrent registrations of the same route are serialized by a short
/// per-route lock (set-if-absent with TTL); whether that lock is sufficient
/// without a consensus-style check is an open question inherited from the
/// protocol — it is enough as long as all writers go through this type.
#[derive(Clone)]
pub struct RouteRegistry {
    store: Arc<dyn Store>,
}

impl RouteRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Advertises `(method, path)` for `worker_version`. Idempotent per
    /// triple; other versions on the same route accumulate as candidates.
    pub async fn register(&self, worker_version: &str, method: Method, path: &str) -> Result<()> {
        let route_id = keys::route_id(method.as_str(), path);
        let lock = StoreLock::new(self.store.clone(), keys::route_lock(&route_id));
        if !lock.acquire(REGISTRATION_LOCK_RETRIES).await? {
            return Err(GateError::Store(format!(
                "registration lock busy for route {}",
                route_id
            )));
        }

        let result = self.register_locked(worker_version, &route_id).await;
        let _ = lock.release().await;
        result
    }

    async fn register_locked(&self, worker_version: &str, route_id: &str) -> Result<()> {
        self.store.set_add(keys::ROUTES_INDEX, route_id).await?;
        let newly_added = self
            .store
            .set_add(&keys::route_members(route_id), worker_version)
            .await?;
        self.store
            .set_add(&keys::worker_routes(worker_version), route_id)
            .await?;
        if newly_added {
            self.store
                .hash_set_field(
                    &keys::route_meta(route_id),
                    worker_version,
                    &Utc::now().to_rfc3339(),
                )
                .await?;
            tracing::info!(worker = worker_version, route = route_id, "Route registered");
        } else {
            tracing::debug!(
                worker = worker_version,
                route = route_id,
                "Route already registered"
            );
        }
        Ok(())
    }

    /// Removes every route `worker_version` registered, dropping routes whose
    /// candidate set becomes empty. Returns the number of routes touched.
    pub async fn deregister(&self, worker_version: &str) -> Result<usize> {
        let route_ids = self
            .store
            .set_members(&keys::worker_routes(worker_version))
            .await?;

        for route_id in &route_ids {
            let lock = StoreLock::new(self.store.clone(), keys::route_lock(route_id));
            if !lock.acquire(REGISTRATION_LOCK_RETRIES).await? {
                return Err(GateError::Store(format!(
                    "registration lock busy for route {}",
                    route_id
                )));
            }

            let result = self.drop_member_locked(worker_version, route_id).await;
            let _ = lock.release().await;
            result?;

            self.store
                .set_remove(&keys::worker_routes(worker_version), route_id)
                .await?;
        }

        self.store
            .kv_delete(&keys::heartbeat(worker_version))
            .await?;

        tracing::info!(
            worker = worker_version,
            routes = route_ids.len(),
            "Worker deregistered"
        );
        Ok(route_ids.len())
    }

    async fn drop_member_locked(&self, worker_version: &str, route_id: &str) -> Result<()> {
        self.store
            .set_remove(&keys::route_members(route_id), worker_version)
            .await?;
        self.store
            .hash_remove_field(&keys::route_meta(route_id), worker_version)
            .await?;

        if self
            .store
            .set_members(&keys::route_members(route_id))
            .await?
            .is_empty()
        {
            self.store.set_remove(keys::ROUTES_INDEX, route_id).await?;
            self.store.kv_delete(&keys::route_cursor(route_id)).await?;
            tracing::info!(route = route_id, "Last candidate gone, route dropped");
        }
        Ok(())
    }

    /// Worker versions offering `(method, path)`, sorted lexicographically.
    /// Exact path match only.
    pub async fn candidates(&self, method: Method, path: &str) -> Result<Vec<String>> {
        let route_id = keys::route_id(method.as_str(), path);
        let mut versions = self
            .store
            .set_members(&keys::route_members(&route_id))
            .await?;
        versions.sort();
        Ok(versions)
    }

    /// Every registered route, one entry per `(method, path, worker_version)`.
    pub async fn list_all(&self) -> Result<Vec<Route>> {
        let mut route_ids = self.store.set_members(keys::ROUTES_INDEX).await?;
        route_ids.sort();

        let mut routes = Vec::new();
        for route_id in route_ids {
            let Some((method, path)) = split_route_id(&route_id) else {
                tracing::warn!(route = %route_id, "Skipping malformed route id in index");
                continue;
            };
            let meta = self.store.hash_get_all(&keys::route_meta(&route_id)).await?;
            let mut versions = self
                .store
                .set_members(&keys::route_members(&route_id))
                .await?;
            versions.sort();

            for worker_version in versions {
                let registered_at = meta.get(&worker_version).and_then(|raw| parse_rfc3339(raw));
                let last_heartbeat_at = self
                    .store
                    .kv_get(&keys::heartbeat(&worker_version))
                    .await?
                    .and_then(|raw| parse_rfc3339(&raw));
                routes.push(Route {
                    method,
                    path: path.clone(),
                    worker_version,
                    registered_at,
                    last_heartbeat_at,
                });
            }
        }
        Ok(routes)
    }

    /// Refreshes the worker's liveness timestamp.
    pub async fn heartbeat(&self, worker_version: &str, now: DateTime<Utc>) -> Result<()> {
        self.store
            .kv_set(
                &keys::heartbeat(worker_version),
                &now.to_rfc3339(),
                Some(HEARTBEAT_TTL),
            )
            .await
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
