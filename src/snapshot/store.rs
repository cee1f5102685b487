//! Snapshot Store
//!
//! Longer-lived store of computed business metrics keyed by
//! `(statistic type, period)`. Freshness is decided by the reader, who
//! passes the validity window on every check.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};

// == Statistics Snapshot ==
/// A timestamped copy of computed metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub statistic_type: String,
    pub period: String,
    /// Serialized metrics, opaque to the store
    pub metrics: Value,
    pub computed_at: DateTime<Utc>,
}

impl StatisticsSnapshot {
    /// Age of the snapshot at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.computed_at
    }
}

// == Snapshot Store ==
/// Concurrent snapshot store: statistic type -> period -> snapshot.
///
/// Writes to the same composite key are serialized by the inner map's shard
/// lock; unrelated types and periods proceed independently.
#[derive(Debug)]
pub struct SnapshotStore {
    by_type: DashMap<String, DashMap<String, StatisticsSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            by_type: DashMap::new(),
            clock,
        }
    }

    // == Get ==
    /// Returns the snapshot stored for `(statistic_type, period)`, if any.
    pub fn get_by_type_and_period(
        &self,
        statistic_type: &str,
        period: &str,
    ) -> Result<Option<StatisticsSnapshot>> {
        validate_composite_key(statistic_type, period)?;
        Ok(self
            .by_type
            .get(statistic_type)
            .and_then(|periods| periods.get(period).map(|snapshot| snapshot.value().clone())))
    }

    // == Upsert ==
    /// Replaces the snapshot for `(statistic_type, period)`, stamping it now.
    pub fn upsert(
        &self,
        statistic_type: &str,
        period: &str,
        metrics: Value,
    ) -> Result<StatisticsSnapshot> {
        validate_composite_key(statistic_type, period)?;
        let snapshot = StatisticsSnapshot {
            statistic_type: statistic_type.to_string(),
            period: period.to_string(),
            metrics,
            computed_at: self.clock.now(),
        };

        // Fast path under the outer shard's read lock
        if let Some(periods) = self.by_type.get(statistic_type) {
            periods.insert(period.to_string(), snapshot.clone());
        } else {
            self.by_type
                .entry(statistic_type.to_string())
                .or_default()
                .insert(period.to_string(), snapshot.clone());
        }

        debug!(
            "Stored snapshot {}/{} computed at {}",
            statistic_type, period, snapshot.computed_at
        );
        Ok(snapshot)
    }

    // == Is Valid ==
    /// Returns whether a snapshot exists and is no older than `validity_window`.
    pub fn is_valid(
        &self,
        statistic_type: &str,
        period: &str,
        validity_window: Duration,
    ) -> Result<bool> {
        if validity_window <= Duration::zero() {
            return Err(CacheError::InvalidArgument(
                "Validity window must be positive".to_string(),
            ));
        }
        let now = self.clock.now();
        Ok(self
            .get_by_type_and_period(statistic_type, period)?
            .map(|snapshot| snapshot.age_at(now) <= validity_window)
            .unwrap_or(false))
    }

    // == List By Type ==
    /// All snapshots of one statistic type, newest first.
    pub fn list_by_type(&self, statistic_type: &str) -> Result<Vec<StatisticsSnapshot>> {
        if statistic_type.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Statistic type cannot be empty".to_string(),
            ));
        }
        let mut snapshots: Vec<StatisticsSnapshot> = self
            .by_type
            .get(statistic_type)
            .map(|periods| periods.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default();
        snapshots.sort_by(|a, b| b.computed_at.cmp(&a.computed_at));
        Ok(snapshots)
    }

    // == Remove ==
    /// Drops a snapshot; returns whether one was stored.
    ///
    /// A type left without periods is dropped too.
    pub fn remove(&self, statistic_type: &str, period: &str) -> Result<bool> {
        validate_composite_key(statistic_type, period)?;
        let removed = self
            .by_type
            .get(statistic_type)
            .map(|periods| periods.remove(period).is_some())
            .unwrap_or(false);
        // Inner read guard released above; remove_if takes the shard write lock
        self.by_type
            .remove_if(statistic_type, |_, periods| periods.is_empty());
        Ok(removed)
    }

    /// Number of stored snapshots across all types.
    pub fn len(&self) -> usize {
        self.by_type.iter().map(|periods| periods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_composite_key(statistic_type: &str, period: &str) -> Result<()> {
    if statistic_type.is_empty() || period.is_empty() {
        return Err(CacheError::InvalidArgument(
            "Statistic type and period are required".to_string(),
        ));
    }
    Ok(())
}
