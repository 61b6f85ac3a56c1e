//! Split HTTP Gateway Library
//!
//! This library crate implements a gateway whose public ingress (the *gate*)
//! and its request handlers (the *workers*) run in separate processes that
//! never talk to each other directly. All coordination flows through a shared
//! store providing queues, key/value state, and atomic primitives, so workers
//! only need outbound connectivity: the gate can live on an ephemeral
//! serverless runtime while workers run on a laptop or an on-prem host.
//!
//! ## Architecture Modules
//! - **`store`**: The shared-store access layer. Defines the capability trait
//!   every other component consumes, the in-process implementation, the
//!   store-level lock, and the key schema.
//! - **`job`**: The unit of work. An `HttpJob` carries one HTTP request and
//!   its eventual response through the store; the repository persists it with
//!   a TTL and guards state transitions.
//! - **`routing`**: The dynamic route registry (workers advertise routes at
//!   runtime) and the selection strategies that pick a worker version for each
//!   matched request.
//! - **`gate`**: The ingress side. The dispatcher turns a request into a
//!   queued job and awaits its completion; the handlers expose the control
//!   plane and the catch-all dispatch route over axum.
//! - **`worker`**: The execution side. A worker registers its handlers,
//!   consumes its own queue, runs the matching handler, and signals
//!   completion.

pub mod config;
pub mod error;
pub mod gate;
pub mod job;
pub mod routing;
pub mod shutdown;
pub mod store;
pub mod worker;
