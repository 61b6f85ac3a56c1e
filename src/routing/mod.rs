//! Dynamic Routing Module
//!
//! Workers advertise their routes at runtime; the gate matches incoming URLs
//! against them and picks a worker version per request.
//!
//! ## Core Mechanisms
//! - **Registry** (`registry`): a durable multimap in the shared store from
//!   `(method, path)` to the set of worker versions offering it, with a
//!   reverse index per worker for cheap deregistration. Registration writes
//!   are serialized by a short store-level lock; reads are lock-free.
//! - **Strategy** (`strategy`): given the matched candidate set, chooses one
//!   version — round-robin over a store-persisted cursor (stable across gate
//!   replicas) or uniform random, optionally pre-filtered by a pinned version
//!   from the request.
//!
//! Because the registry lives in the store rather than gate memory, a freshly
//! cold-started gate instance sees the current routes immediately.

pub mod registry;
pub mod strategy;
pub mod types;
