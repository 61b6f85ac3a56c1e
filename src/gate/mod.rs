//! Gate Module
//!
//! The public-facing side of the gateway. The gate owns no handler logic: it
//! turns each inbound request into a persisted job, queues the job's id for
//! the worker version chosen by the routing layer, and waits for the worker
//! to write the response back through the store.
//!
//! ## Submodules
//! - **`dispatcher`**: the request -> job -> response protocol, including the
//!   completion wait, the dispatch deadline, and the stuck-worker fallback.
//! - **`handlers`**: the axum router. A small allow-list of locally served
//!   control-plane endpoints (`/health`, `/routes`, `/api/jobs/*`,
//!   `/api/queue/size`); everything else falls through to dispatch.

pub mod dispatcher;
pub mod handlers;
