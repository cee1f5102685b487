//! Ristorante Cache - caching core of a restaurant backend
//!
//! Provides a TTL entry store with bulk operations, a statistics snapshot
//! store, domain preload routines and a background refresh scheduler.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod preload;
pub mod snapshot;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{CacheScheduler, SchedulerConfig, SchedulerDeps, SchedulerHandle};
