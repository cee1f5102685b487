//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use chrono::{DateTime, Duration, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// Approximate encoded size of the value in bytes
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry created at `now` with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `size_bytes` - Approximate size of the value, for reporting
    /// * `ttl_seconds` - Optional TTL in seconds
    /// * `now` - Creation instant
    pub fn new(value: V, size_bytes: usize, ttl_seconds: Option<u64>, now: DateTime<Utc>) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: expiry_from(now, ttl_seconds),
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `expires_at <= now`, so
    /// the instant the TTL fully elapses it is already logically absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => expires <= now,
            None => false,
        }
    }

    // == Reset TTL ==
    /// Replaces the expiration with `ttl_seconds` counted from `now`.
    pub fn reset_ttl(&mut self, ttl_seconds: Option<u64>, now: DateTime<Utc>) {
        self.expires_at = expiry_from(now, ttl_seconds);
    }

    // == Time To Live ==
    /// Returns remaining TTL in whole seconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_seconds)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at.map(|expires| {
            let remaining = expires - now;
            remaining.num_seconds().max(0) as u64
        })
    }
}

/// Saturates at the maximum representable instant for absurdly large TTLs.
fn expiry_from(now: DateTime<Utc>, ttl_seconds: Option<u64>) -> Option<DateTime<Utc>> {
    ttl_seconds.map(|ttl| {
        i64::try_from(ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}
