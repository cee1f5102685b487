//! Cache Store Module
//!
//! Main cache engine: a sharded expiring key/value map with lazy expiration,
//! periodic sweeps and hit/miss accounting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::stats::hit_rate_percent;
use crate::cache::{CacheEntry, CacheInfo, CleanupReport, StatsCounter, MAX_KEY_LENGTH};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};

/// Entry store holding JSON payloads, as used by the HTTP surface.
pub type JsonCache = CacheStore<serde_json::Value>;

// == Cache Store ==
/// Expiring key/value store, safe to share behind an `Arc`.
///
/// Each key lives in one shard of a `DashMap`, so writers on different keys
/// only contend when they hash to the same shard, and every write replaces
/// the whole entry (value, TTL and creation time) under that shard's lock.
/// The store is value-agnostic; `V` only needs to serialize so its size can
/// be reported.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: DashMap<String, CacheEntry<V>>,
    /// Hit/miss counters
    stats: StatsCounter,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Maximum encoded value size in bytes
    max_value_size: usize,
    clock: Arc<dyn Clock>,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize,
{
    // == Constructor ==
    /// Creates a new CacheStore backed by the system clock.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    /// * `max_value_size` - Maximum encoded size of a single value in bytes
    pub fn new(max_entries: usize, max_value_size: usize) -> Self {
        Self::with_clock(max_entries, max_value_size, Arc::new(SystemClock))
    }

    /// Creates a new CacheStore reading time from `clock`.
    pub fn with_clock(max_entries: usize, max_value_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            stats: StatsCounter::new(),
            max_entries,
            max_value_size,
            clock,
        }
    }

    /// Current time as seen by this store.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// Overwriting an existing key replaces value and expiration together.
    /// When a new key would exceed capacity, expired entries are swept first.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL in seconds; `None` never expires
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<u64>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        validate_ttl(ttl)?;

        let size_bytes = serde_json::to_vec(&value)?.len();
        if size_bytes > self.max_value_size {
            return Err(CacheError::InvalidArgument(format!(
                "Value exceeds maximum size of {} bytes",
                self.max_value_size
            )));
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.cleanup_expired();
            if self.entries.len() >= self.max_entries {
                return Err(CacheError::CacheFull(format!(
                    "Cache holds the maximum of {} entries",
                    self.max_entries
                )));
            }
        }

        let now = self.clock.now();
        self.entries
            .insert(key, CacheEntry::new(value, size_bytes, ttl, now));

        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Live entries count as hits. Absent and expired entries count as
    /// misses; expired ones are removed on the way out.
    pub fn get(&self, key: &str) -> Result<V> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get) but returns the whole entry with its metadata.
    pub fn get_entry(&self, key: &str) -> Result<CacheEntry<V>> {
        let now = self.clock.now();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired_at(now)).then(|| entry.value().clone()));

        match lookup {
            Some(Some(entry)) => {
                self.stats.record_hit();
                Ok(entry)
            }
            Some(None) => {
                self.evict_if_expired(key, now);
                self.stats.record_miss();
                Err(CacheError::Expired(key.to_string()))
            }
            None => {
                self.stats.record_miss();
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    // == Exists ==
    /// Returns whether `key` holds a live entry, without touching counters.
    pub fn exists(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.entries.get(key).map(|entry| entry.is_expired_at(now)) {
            Some(false) => true,
            Some(true) => {
                self.evict_if_expired(key, now);
                false
            }
            None => false,
        }
    }

    // == Remove ==
    /// Removes an entry by key.
    ///
    /// Removing an absent key succeeds with `false`; an expired entry is
    /// dropped but also reported as `false` since it was already gone.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired_at(now))
            .unwrap_or(false))
    }

    // == Refresh ==
    /// Replaces the TTL of a live entry, counted from now, keeping its value.
    ///
    /// Returns `false` if the key is absent or already expired.
    pub fn refresh(&self, key: &str, ttl: Option<u64>) -> Result<bool> {
        validate_ttl(ttl)?;
        let now = self.clock.now();
        let outcome = self.entries.get_mut(key).map(|mut entry| {
            if entry.is_expired_at(now) {
                false
            } else {
                entry.reset_ttl(ttl, now);
                true
            }
        });

        match outcome {
            Some(true) => Ok(true),
            Some(false) => {
                self.evict_if_expired(key, now);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and reports what was freed.
    pub fn cleanup_expired(&self) -> CleanupReport {
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        self.entries.retain(|_, entry| {
            if entry.is_expired_at(now) {
                report.entries_removed += 1;
                report.bytes_freed += entry.size_bytes;
                false
            } else {
                true
            }
        });
        self.stats.record_cleanup(now);

        if report.entries_removed > 0 {
            info!(
                "TTL cleanup: removed {} expired entries ({} bytes)",
                report.entries_removed, report.bytes_freed
            );
        } else {
            debug!("TTL cleanup: no expired entries found");
        }
        report
    }

    // == Compact ==
    /// Releases spare capacity held by the backing map.
    ///
    /// The visible key set is unchanged. Returns the number of stored entries.
    pub fn compact(&self) -> usize {
        self.entries.shrink_to_fit();
        let remaining = self.entries.len();
        debug!("Compacted entry store, {} entries retained", remaining);
        remaining
    }

    // == Info ==
    /// Returns current counters and live-entry totals.
    pub fn info(&self) -> CacheInfo {
        let now = self.clock.now();
        let (entry_count, approximate_bytes) = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .fold((0, 0), |(count, bytes), entry| {
                (count + 1, bytes + entry.size_bytes)
            });
        let hits_total = self.stats.hits();
        let misses_total = self.stats.misses();

        CacheInfo {
            entry_count,
            hits_total,
            misses_total,
            hit_rate_percent: hit_rate_percent(hits_total, misses_total),
            approximate_bytes,
            last_cleanup_at: self.stats.last_cleanup_at(),
        }
    }

    // == Length ==
    /// Returns the number of stored entries, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes `key` only if it is still expired, so a concurrent `set` wins.
    fn evict_if_expired(&self, key: &str, now: DateTime<Utc>) {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired_at(now));
    }
}

// == Validation ==
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

pub(crate) fn validate_ttl(ttl: Option<u64>) -> Result<()> {
    if ttl == Some(0) {
        return Err(CacheError::InvalidArgument(
            "TTL must be at least one second".to_string(),
        ));
    }
    Ok(())
}
