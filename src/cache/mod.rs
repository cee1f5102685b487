//! Cache Module
//!
//! Provides the in-memory entry store with TTL expiration, hit/miss
//! accounting and batched operations.

mod bulk;
mod entry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use bulk::{BulkGetResult, BulkRemoveResult, BulkSetResult};
pub use entry::CacheEntry;
pub use stats::{CacheInfo, CleanupReport, StatsCounter};
pub use store::{CacheStore, JsonCache};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Default maximum value size in bytes
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
