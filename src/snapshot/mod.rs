//! Statistics Snapshot Module
//!
//! Stores computed business metrics separately from the live entry store.

mod store;

pub use store::{SnapshotStore, StatisticsSnapshot};

/// Statistic type written by the scheduler for cart metrics.
pub const STAT_TYPE_CART: &str = "cart";

/// Period label for the current day.
pub const PERIOD_TODAY: &str = "today";
