//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `/cache/...` - Entry store, bulk operations, maintenance and preload
//! - `/statisticheCache/...` - Statistics snapshot reads and writes
//! - `GET /scheduler/status` - Background scheduler state

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
