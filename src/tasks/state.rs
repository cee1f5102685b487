//! Scheduler State
//!
//! Counters owned by the background scheduler. Only the scheduler's own loop
//! writes them; monitoring endpoints read them concurrently through atomics.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

const NEVER: i64 = i64::MIN;

// == Scheduler Phase ==
/// Lifecycle of the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SchedulerPhase {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SchedulerPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SchedulerPhase::Starting,
            1 => SchedulerPhase::Running,
            2 => SchedulerPhase::Stopping,
            _ => SchedulerPhase::Stopped,
        }
    }
}

// == Scheduler State ==
#[derive(Debug)]
pub struct SchedulerState {
    phase: AtomicU8,
    execution_count: AtomicU64,
    error_count: AtomicU64,
    realtime_refreshes: AtomicU64,
    snapshots_written: AtomicU64,
    cleanups_run: AtomicU64,
    started_at_ms: AtomicI64,
    last_execution_ms: AtomicI64,
    last_tick_failed: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(SchedulerPhase::Starting as u8),
            execution_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            realtime_refreshes: AtomicU64::new(0),
            snapshots_written: AtomicU64::new(0),
            cleanups_run: AtomicU64::new(0),
            started_at_ms: AtomicI64::new(NEVER),
            last_execution_ms: AtomicI64::new(NEVER),
            last_tick_failed: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    // == Writers (scheduler loop only) ==

    pub(crate) fn set_phase(&self, phase: SchedulerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn mark_started(&self, at: DateTime<Utc>) {
        self.started_at_ms
            .store(at.timestamp_millis(), Ordering::Release);
    }

    pub(crate) fn record_success(&self, at: DateTime<Utc>) {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
        self.last_execution_ms
            .store(at.timestamp_millis(), Ordering::Release);
        self.last_tick_failed.store(false, Ordering::Release);
    }

    pub(crate) fn record_failure(&self, error: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(error.to_string());
        self.last_tick_failed.store(true, Ordering::Release);
    }

    pub(crate) fn record_realtime_refresh(&self) {
        self.realtime_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot(&self) {
        self.snapshots_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup(&self) {
        self.cleanups_run.fetch_add(1, Ordering::Relaxed);
    }

    // == Readers ==

    pub fn phase(&self) -> SchedulerPhase {
        SchedulerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn realtime_refreshes(&self) -> u64 {
        self.realtime_refreshes.load(Ordering::Relaxed)
    }

    pub fn snapshots_written(&self) -> u64 {
        self.snapshots_written.load(Ordering::Relaxed)
    }

    pub fn cleanups_run(&self) -> u64 {
        self.cleanups_run.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        load_timestamp(&self.started_at_ms)
    }

    pub fn last_execution_at(&self) -> Option<DateTime<Utc>> {
        load_timestamp(&self.last_execution_ms)
    }

    pub fn last_tick_failed(&self) -> bool {
        self.last_tick_failed.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Everything above in one serializable value; uptime is measured to `now`.
    pub fn status(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let started_at = self.started_at();
        SchedulerStatus {
            phase: self.phase(),
            execution_count: self.execution_count(),
            last_execution_at: self.last_execution_at(),
            started_at,
            uptime_seconds: started_at
                .map(|started| (now - started).num_seconds().max(0) as u64)
                .unwrap_or(0),
            error_count: self.error_count(),
            last_error: self.last_error(),
            last_tick_failed: self.last_tick_failed(),
            realtime_refreshes: self.realtime_refreshes(),
            snapshots_written: self.snapshots_written(),
            cleanups_run: self.cleanups_run(),
        }
    }
}

fn load_timestamp(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    match cell.load(Ordering::Acquire) {
        NEVER => None,
        ms => DateTime::from_timestamp_millis(ms),
    }
}

// == Scheduler Status ==
/// Read-only view of the scheduler for dashboards and health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub phase: SchedulerPhase,
    pub execution_count: u64,
    pub last_execution_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_tick_failed: bool,
    pub realtime_refreshes: u64,
    pub snapshots_written: u64,
    pub cleanups_run: u64,
}
