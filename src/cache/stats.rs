//! Cache Statistics Module
//!
//! Tracks hit/miss counters and the last cleanup time for one entry store.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sentinel stored in `last_cleanup_ms` before the first sweep.
const NEVER: i64 = i64::MIN;

// == Stats Counter ==
/// Process-wide counters for one entry store.
///
/// Hits and misses only ever increase. All fields are atomics so request
/// handlers and the scheduler can update them without a shared lock.
#[derive(Debug)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    last_cleanup_ms: AtomicI64,
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            last_cleanup_ms: AtomicI64::new(NEVER),
        }
    }
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Cleanup ==
    pub fn record_cleanup(&self, at: DateTime<Utc>) {
        self.last_cleanup_ms
            .store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn last_cleanup_at(&self) -> Option<DateTime<Utc>> {
        match self.last_cleanup_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

// == Cache Info ==
/// Point-in-time report of an entry store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Entries not known to be expired
    pub entry_count: usize,
    pub hits_total: u64,
    pub misses_total: u64,
    /// hits / (hits + misses) * 100, or 0 when nothing was read yet
    pub hit_rate_percent: f64,
    /// Sum of the live entries' approximate sizes
    pub approximate_bytes: usize,
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

/// Hit rate in percent; defined as 0 when there were no reads.
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

// == Cleanup Report ==
/// Outcome of an expired-entry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub entries_removed: usize,
    pub bytes_freed: usize,
}
