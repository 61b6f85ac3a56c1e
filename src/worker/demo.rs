//! Reference handler set used by the bundled binaries.
//!
//! A store-backed counter (increment, decrement, reset, get) plus an echo
//! route. The counter leans on the store's atomic increment, so concurrent
//! workers sharing a store agree on the value.

use std::sync::Arc;

use super::registry::{HandlerRegistry, HandlerResponse};
use crate::job::types::{HttpJob, Method};
use crate::store::Store;

fn counter_key(name: &str) -> String {
    format!("counter:{}", name)
}

/// Pulls `{"name": ..., "amount": ...}` from the request body, with the
/// usual defaults.
fn counter_args(job: &HttpJob) -> (String, i64) {
    let data: serde_json::Value = serde_json::from_slice(&job.body).unwrap_or_default();
    let name = data
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string();
    let amount = data.get("amount").and_then(|v| v.as_i64()).unwrap_or(1);
    (name, amount)
}

fn counter_body(name: &str, value: i64) -> serde_json::Value {
    serde_json::json!({ "name": name, "value": value })
}

/// Builds the demo handler registry against the given store.
pub fn handlers(store: Arc<dyn Store>) -> Arc<HandlerRegistry> {
    let handlers = HandlerRegistry::new();

    let counter = store.clone();
    handlers.register(Method::Post, "/api/counter/increment", move |job: HttpJob| {
        let store = counter.clone();
        async move {
            let (name, amount) = counter_args(&job);
            let value = store.atomic_increment(&counter_key(&name), amount).await?;
            Ok(HandlerResponse::json(200, &counter_body(&name, value)))
        }
    });

    let counter = store.clone();
    handlers.register(Method::Post, "/api/counter/decrement", move |job: HttpJob| {
        let store = counter.clone();
        async move {
            let (name, amount) = counter_args(&job);
            let value = store.atomic_increment(&counter_key(&name), -amount).await?;
            Ok(HandlerResponse::json(200, &counter_body(&name, value)))
        }
    });

    let counter = store.clone();
    handlers.register(Method::Post, "/api/counter/reset", move |job: HttpJob| {
        let store = counter.clone();
        async move {
            let (name, _) = counter_args(&job);
            store.kv_set(&counter_key(&name), "0", None).await?;
            Ok(HandlerResponse::json(200, &counter_body(&name, 0)))
        }
    });

    let counter = store.clone();
    handlers.register(Method::Get, "/api/counter/get", move |job: HttpJob| {
        let store = counter.clone();
        async move {
            let name = job
                .query
                .get("name")
                .cloned()
                .unwrap_or_else(|| "default".to_string());
            let value = store
                .kv_get(&counter_key(&name))
                .await?
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0);
            Ok(HandlerResponse::json(200, &counter_body(&name, value)))
        }
    });

    handlers.register(Method::Get, "/echo", |job: HttpJob| async move {
        Ok(HandlerResponse::json(
            200,
            &serde_json::json!({
                "method": job.method.as_str(),
                "path": job.path,
                "query": job.query,
                "body_bytes": job.body.len(),
            }),
        ))
    });

    handlers
}
