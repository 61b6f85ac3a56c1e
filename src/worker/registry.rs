use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use crate::job::types::{HttpJob, Method};
use crate::routing::types::split_route_id;
use crate::store::keys;

/// What a handler hands back: a status, headers, and a body the gate relays
/// verbatim.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    /// JSON response with the matching content type.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }
}

pub type HandlerResult = anyhow::Result<HandlerResponse>;

pub type HandlerFn =
    Arc<dyn Fn(HttpJob) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Maps `(method, path)` to a typed async handler.
///
/// Handlers are registered explicitly at startup; the worker advertises one
/// route per entry during bring-up.
pub struct HandlerRegistry {
    handlers: DashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: DashMap::new(),
        })
    }

    pub fn register<F, Fut>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(HttpJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler_fn: HandlerFn = Arc::new(move |job: HttpJob| {
            Box::pin(handler(job)) as Pin<Box<dyn Future<Output = HandlerResult> + Send>>
        });

        self.handlers
            .insert(keys::route_id(method.as_str(), path), handler_fn);

        tracing::info!(method = %method, path, "Registered handler");
    }

    pub fn get(&self, method: Method, path: &str) -> Option<HandlerFn> {
        self.handlers
            .get(&keys::route_id(method.as_str(), path))
            .map(|entry| entry.value().clone())
    }

    pub fn has_handler(&self, method: Method, path: &str) -> bool {
        self.handlers
            .contains_key(&keys::route_id(method.as_str(), path))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The `(method, path)` pairs to advertise in the route registry.
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.handlers
            .iter()
            .filter_map(|entry| split_route_id(entry.key()))
            .collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}
