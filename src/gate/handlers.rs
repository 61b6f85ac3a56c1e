//! Gate HTTP Handlers
//!
//! Axum route handlers for the gate's control plane plus the catch-all
//! dispatch route. The locally served allow-list (`/health`, `/routes`,
//! `/api/jobs/*`, `/api/queue/size`) is wired as explicit routes; every other
//! path and method falls through to [`handle_dispatch`], which forwards the
//! request to a worker via the store.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{DefaultBodyLimit, Path, Query, Request};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, RequestExt, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::dispatcher::JobDispatcher;
use crate::error::{GateError, Result};
use crate::job::repository::JobRepository;
use crate::job::types::{HttpJob, Method, REQUEST_ID_HEADER, SERVED_BY_HEADER};
use crate::routing::registry::RouteRegistry;

/// Shared state handed to every handler via an `Extension` layer.
pub struct GateContext {
    pub repository: JobRepository,
    pub registry: RouteRegistry,
    pub dispatcher: JobDispatcher,
}

/// Builds the gate router: the control-plane allow-list plus the dispatch
/// fallback.
pub fn router(ctx: Arc<GateContext>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/routes", get(handle_routes))
        .route(
            "/api/jobs/:request_id",
            get(handle_get_job).delete(handle_delete_job),
        )
        .route("/api/queue/size", get(handle_queue_size))
        .fallback(handle_dispatch)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(Extension(ctx))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct RouteInfo {
    method: String,
    path: String,
    worker_version: String,
    last_heartbeat_at: Option<DateTime<Utc>>,
}

async fn handle_routes(Extension(ctx): Extension<Arc<GateContext>>) -> Response {
    match ctx.registry.list_all().await {
        Ok(routes) => {
            let info: Vec<RouteInfo> = routes
                .into_iter()
                .map(|route| RouteInfo {
                    method: route.method.to_string(),
                    path: route.path,
                    worker_version: route.worker_version,
                    last_heartbeat_at: route.last_heartbeat_at,
                })
                .collect();
            Json(info).into_response()
        }
        Err(e) => error_response(&e, None),
    }
}

async fn handle_get_job(
    Extension(ctx): Extension<Arc<GateContext>>,
    Path(request_id): Path<String>,
) -> Response {
    match ctx.repository.get(&request_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => error_response(&GateError::JobNotFound(request_id.clone()), Some(&request_id)),
        Err(e) => error_response(&e, Some(&request_id)),
    }
}

async fn handle_delete_job(
    Extension(ctx): Extension<Arc<GateContext>>,
    Path(request_id): Path<String>,
) -> Response {
    // Unconditional removal: deleting an unknown job is still a success.
    match ctx.repository.delete(&request_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e, Some(&request_id)),
    }
}

async fn handle_queue_size(
    Extension(ctx): Extension<Arc<GateContext>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(worker) = params.get("worker") else {
        return error_response(
            &GateError::BadRequest("missing worker query parameter".to_string()),
            None,
        );
    };
    match ctx.repository.queue_len(worker).await {
        Ok(size) => Json(serde_json::json!({ "size": size })).into_response(),
        Err(e) => error_response(&e, None),
    }
}

/// Catch-all: forwards the request to a worker and relays its response.
async fn handle_dispatch(
    Extension(ctx): Extension<Arc<GateContext>>,
    request: Request,
) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let (parts, body) = request.with_limited_body().into_parts();
    let method = match Method::from_str(parts.method.as_str()) {
        Ok(method) => method,
        Err(e) => return error_response(&e, Some(&request_id)),
    };
    let path = parts.uri.path().to_string();
    let query = match parse_query(&parts.uri) {
        Ok(query) => query,
        Err(e) => return error_response(&e, Some(&request_id)),
    };

    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            return error_response(
                &GateError::BadRequest(format!("unreadable request body: {}", e)),
                Some(&request_id),
            )
        }
    };

    match ctx
        .dispatcher
        .dispatch(&request_id, method, &path, query, headers, body)
        .await
    {
        Ok(job) => job_response(job),
        Err(e) => error_response(&e, Some(&request_id)),
    }
}

/// Emits the worker's recorded response verbatim, tagged with the request id
/// and the worker version that served it.
fn job_response(job: HttpJob) -> Response {
    let status = StatusCode::from_u16(job.response_status.unwrap_or(200)).unwrap_or(StatusCode::OK);

    let mut builder = Response::builder().status(status);
    for (name, value) in &job.response_headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header(REQUEST_ID_HEADER, job.request_id.as_str());
    if let Some(worker) = job.target_worker.as_deref() {
        builder = builder.header(SERVED_BY_HEADER, worker);
    }

    match builder.body(Body::from(job.response_body)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %job.request_id, "Invalid worker response: {}", e);
            error_response(
                &GateError::Store("worker produced an unmappable response".to_string()),
                Some(&job.request_id),
            )
        }
    }
}

/// Maps an error to its HTTP status and the standard JSON error body. Store
/// internals are logged server-side, never echoed to the client.
fn error_response(error: &GateError, request_id: Option<&str>) -> Response {
    match error {
        GateError::Store(_) | GateError::Serde(_) => {
            tracing::error!("Store-level failure: {}", error)
        }
        _ => tracing::debug!("Request rejected: {}", error),
    }

    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = serde_json::json!({ "error": error.tag() });
    if let Some(id) = request_id {
        body["request_id"] = serde_json::Value::String(id.to_string());
    }
    (status, Json(body)).into_response()
}

/// Decodes the request's query string through the same deserializer the
/// [`Query`] extractor uses, so percent escapes and `+` come out as the
/// handler expects. Multi-valued keys collapse to the last value.
pub(crate) fn parse_query(uri: &Uri) -> Result<HashMap<String, String>> {
    let Query(query) = Query::try_from_uri(uri)
        .map_err(|e| GateError::BadRequest(format!("invalid query string: {}", e)))?;
    Ok(query)
}
