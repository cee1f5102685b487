//! Cache Refresh Scheduler
//!
//! Background loop that keeps the caches warm. On every tick it recomputes
//! today's statistics and renews the realtime keys; when a :00 or :30
//! boundary has passed it snapshots the day's statistics; when a :00
//! boundary has passed it sweeps expired entries.
//!
//! Successful ticks are followed by a sleep to the next wall-clock multiple
//! of the tick interval, so a process started at 12:02 with a five minute
//! interval ticks at 12:05, 12:10 and so on. A failed tick is followed by
//! the shorter backoff, relative to the failure, after which the next
//! success snaps back onto the grid. Only cancellation ends the loop.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CleanupReport, JsonCache};
use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::preload::{Preloader, StatisticsSource, KEY_STATISTICS_TODAY};
use crate::snapshot::{SnapshotStore, PERIOD_TODAY, STAT_TYPE_CART};
use crate::tasks::{SchedulerPhase, SchedulerState};

/// Statistics snapshots are taken on every half-hour boundary.
const SNAPSHOT_EVERY_MINUTES: i64 = 30;
/// Expired entries are swept on every hour boundary.
const CLEANUP_EVERY_MINUTES: i64 = 60;

// == Scheduler Config ==
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wall-clock grid successful ticks are aligned to
    pub tick_interval: Duration,
    /// Delay after a failed tick
    pub error_backoff: Duration,
    /// Keys whose TTL is renewed on every tick
    pub realtime_keys: Vec<String>,
    /// TTL in seconds given to realtime keys on renewal
    pub realtime_ttl: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
            realtime_keys: vec![KEY_STATISTICS_TODAY.to_string()],
            realtime_ttl: 360,
        }
    }
}

/// Collaborators the scheduler drives.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub cache: Arc<JsonCache>,
    pub snapshots: Arc<SnapshotStore>,
    /// Rewrites `statistiche:oggi` when it is a realtime key
    pub preloader: Arc<Preloader>,
    /// Feeds the half-hourly snapshots
    pub statistics: Arc<dyn StatisticsSource>,
    pub clock: Arc<dyn Clock>,
}

// == Tick Report ==
/// What one successful tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    /// Whether `statistiche:oggi` was recomputed from the source
    pub statistics_recomputed: bool,
    /// Realtime keys that were live and got their TTL renewed
    pub realtime_refreshed: usize,
    pub snapshot_written: bool,
    pub cleanup: Option<CleanupReport>,
}

// == Cache Scheduler ==
pub struct CacheScheduler {
    inner: Arc<TickRunner>,
    cancel: CancellationToken,
}

/// A running scheduler together with the token that stops it.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancels the loop and waits until it has reached `Stopped`.
    pub async fn shutdown(self) -> std::result::Result<(), JoinError> {
        self.cancel.cancel();
        self.task.await
    }
}

impl CacheScheduler {
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(TickRunner {
                deps,
                config,
                state: Arc::new(SchedulerState::new()),
                last_tick_at: Mutex::new(None),
            }),
            cancel,
        }
    }

    /// Shared handle to the scheduler's counters.
    pub fn state(&self) -> Arc<SchedulerState> {
        Arc::clone(&self.inner.state)
    }

    /// Spawns [`run`](Self::run) on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Like [`spawn`](Self::spawn), keeping the token needed to stop it.
    pub fn start(self) -> SchedulerHandle {
        let cancel = self.cancel.clone();
        SchedulerHandle {
            cancel,
            task: self.spawn(),
        }
    }

    /// Runs until the cancellation token fires.
    pub async fn run(self) {
        let state = &self.inner.state;
        let config = &self.inner.config;
        let clock = &self.inner.deps.clock;

        state.mark_started(clock.now());
        state.set_phase(SchedulerPhase::Running);
        info!(
            "Cache scheduler started: tick every {}s, backoff {}s",
            config.tick_interval.as_secs(),
            config.error_backoff.as_secs()
        );

        let mut delay = delay_until_next_tick(clock.now(), config.tick_interval);
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            delay = match self.run_tick().await {
                Ok(report) => {
                    state.record_success(clock.now());
                    debug!(
                        "Tick at {}: statistics recomputed={}, {} realtime keys refreshed, snapshot={}, cleanup={:?}",
                        report.at,
                        report.statistics_recomputed,
                        report.realtime_refreshed,
                        report.snapshot_written,
                        report.cleanup
                    );
                    delay_until_next_tick(clock.now(), config.tick_interval)
                }
                Err(err) => {
                    let message = err.to_string();
                    state.record_failure(&message);
                    error!(
                        "{}; retrying in {}s",
                        message,
                        config.error_backoff.as_secs()
                    );
                    config.error_backoff
                }
            };
        }

        state.set_phase(SchedulerPhase::Stopping);
        info!(
            "Cache scheduler stopping after {} ticks ({} failed)",
            state.execution_count(),
            state.error_count()
        );
        state.set_phase(SchedulerPhase::Stopped);
    }

    /// Runs one tick in its own task so even a panic becomes a tick failure.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let runner = Arc::clone(&self.inner);
        match tokio::spawn(async move { runner.tick().await }).await {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_panic() => Err(CacheError::SchedulerTick(format!(
                "tick panicked: {}",
                panic_message(join_err.into_panic())
            ))),
            Err(join_err) => Err(CacheError::SchedulerTick(join_err.to_string())),
        }
    }
}

struct TickRunner {
    deps: SchedulerDeps,
    config: SchedulerConfig,
    state: Arc<SchedulerState>,
    /// When the previous tick started, failed or not
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

impl TickRunner {
    #[instrument(skip(self))]
    async fn tick(&self) -> Result<TickReport> {
        let now = self.deps.clock.now();
        let previous = self.last_tick_at.lock().replace(now);
        let mut failures = Vec::new();

        // 1. Realtime keys, every tick
        let mut statistics_recomputed = false;
        if self
            .config
            .realtime_keys
            .iter()
            .any(|key| key == KEY_STATISTICS_TODAY)
        {
            match self.deps.preloader.cache_statistiche().await {
                Ok(_) => statistics_recomputed = true,
                Err(failure) => {
                    warn!("Realtime statistics refresh failed: {}", failure.reason);
                    failures.push(format!(
                        "realtime statistics refresh failed: {}",
                        failure.reason
                    ));
                }
            }
        }
        let mut realtime_refreshed = 0;
        for key in &self.config.realtime_keys {
            if self.deps.cache.refresh(key, Some(self.config.realtime_ttl))? {
                realtime_refreshed += 1;
            }
        }
        if failures.is_empty() {
            self.state.record_realtime_refresh();
        }

        // 2. Statistics snapshot; a failure here must not skip step 3
        let mut snapshot_written = false;
        if boundary_crossed(previous, now, SNAPSHOT_EVERY_MINUTES) {
            match self.write_daily_snapshot(now).await {
                Ok(()) => {
                    snapshot_written = true;
                    self.state.record_snapshot();
                }
                Err(err) => {
                    warn!("Statistics snapshot failed: {:#}", err);
                    failures.push(format!("statistics snapshot failed: {:#}", err));
                }
            }
        }

        // 3. Expired-entry sweep on the hour
        let cleanup = if boundary_crossed(previous, now, CLEANUP_EVERY_MINUTES) {
            let report = self.deps.cache.cleanup_expired();
            self.state.record_cleanup();
            Some(report)
        } else {
            None
        };

        if !failures.is_empty() {
            return Err(CacheError::SchedulerTick(failures.join("; ")));
        }

        Ok(TickReport {
            at: now,
            statistics_recomputed,
            realtime_refreshed,
            snapshot_written,
            cleanup,
        })
    }

    async fn write_daily_snapshot(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let metrics = self
            .deps
            .statistics
            .daily_metrics(now.date_naive())
            .await?;
        self.deps
            .snapshots
            .upsert(STAT_TYPE_CART, PERIOD_TODAY, metrics)?;
        Ok(())
    }
}

/// Time left until the next wall-clock multiple of `interval`.
///
/// Exactly on a multiple the full interval is returned.
fn delay_until_next_tick(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = i64::try_from(interval.as_millis())
        .unwrap_or(i64::MAX)
        .max(1);
    let into_period = now.timestamp_millis().rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - into_period) as u64)
}

/// Whether a wall-clock multiple of `every_minutes` lies in `(previous, now]`.
///
/// Without a previous tick only a tick inside the boundary minute counts.
fn boundary_crossed(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    every_minutes: i64,
) -> bool {
    let period_ms = every_minutes * 60_000;
    let now_ms = now.timestamp_millis();
    let boundary_ms = now_ms - now_ms.rem_euclid(period_ms);
    match previous {
        Some(previous) => previous.timestamp_millis() < boundary_ms,
        None => now_ms - boundary_ms < 60_000,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::preload::{InMemorySources, PreloadSources, PreloadTtls, SeedData};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::{json, Value};

    struct Failing;

    #[async_trait]
    impl StatisticsSource for Failing {
        async fn daily_metrics(&self, _day: NaiveDate) -> anyhow::Result<Value> {
            anyhow::bail!("orders database unreachable")
        }
    }

    struct Fixture {
        scheduler: CacheScheduler,
        cache: Arc<JsonCache>,
        snapshots: Arc<SnapshotStore>,
        clock: Arc<ManualClock>,
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn seeded() -> Arc<InMemorySources> {
        Arc::new(InMemorySources::new(SeedData {
            statistics: json!({"carts": 3}),
            ..SeedData::default()
        }))
    }

    fn fixture(statistics: Arc<dyn StatisticsSource>, config: SchedulerConfig) -> Fixture {
        fixture_with_preload(statistics, seeded(), config)
    }

    fn fixture_with_preload(
        statistics: Arc<dyn StatisticsSource>,
        preload_statistics: Arc<dyn StatisticsSource>,
        config: SchedulerConfig,
    ) -> Fixture {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let cache = Arc::new(JsonCache::with_clock(100, 4096, clock.clone()));
        let snapshots = Arc::new(SnapshotStore::with_clock(clock.clone()));
        let sources = PreloadSources {
            statistics: preload_statistics,
            ..PreloadSources::from_shared(seeded())
        };
        let preloader = Arc::new(Preloader::new(
            cache.clone(),
            sources,
            PreloadTtls::default(),
            clock.clone(),
        ));
        let deps = SchedulerDeps {
            cache: cache.clone(),
            snapshots: snapshots.clone(),
            preloader,
            statistics,
            clock: clock.clone(),
        };
        Fixture {
            scheduler: CacheScheduler::new(deps, config, CancellationToken::new()),
            cache,
            snapshots,
            clock,
        }
    }

    #[tokio::test]
    async fn test_tick_on_the_hour_snapshots_and_sweeps() {
        let f = fixture(seeded(), SchedulerConfig::default());
        f.cache.set("stale", json!(1), Some(1)).unwrap();
        f.clock.advance(chrono::Duration::seconds(2));
        f.clock.set(at(13, 0));

        let report = f.scheduler.run_tick().await.unwrap();

        assert!(report.snapshot_written);
        assert_eq!(report.cleanup.map(|c| c.entries_removed), Some(1));
        let snapshot = f
            .snapshots
            .get_by_type_and_period(STAT_TYPE_CART, PERIOD_TODAY)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.metrics["metrics"]["carts"], 3);
        assert_eq!(snapshot.metrics["day"], "2024-05-01");
    }

    #[tokio::test]
    async fn test_tick_on_the_half_hour_snapshots_only() {
        let f = fixture(seeded(), SchedulerConfig::default());
        f.clock.set(at(12, 30));

        let report = f.scheduler.run_tick().await.unwrap();

        assert!(report.snapshot_written);
        assert!(report.cleanup.is_none());
        assert_eq!(f.scheduler.state().cleanups_run(), 0);
    }

    #[tokio::test]
    async fn test_tick_off_boundary_refreshes_only() {
        let f = fixture(seeded(), SchedulerConfig::default());
        f.clock.set(at(12, 5));

        let report = f.scheduler.run_tick().await.unwrap();

        assert!(!report.snapshot_written);
        assert!(report.cleanup.is_none());
        assert!(f.snapshots.is_empty());
        assert_eq!(f.scheduler.state().realtime_refreshes(), 1);
    }

    #[tokio::test]
    async fn test_tick_after_crossing_half_hour_snapshots_once() {
        let f = fixture(seeded(), SchedulerConfig::default());
        f.clock.set(at(12, 27));
        assert!(!f.scheduler.run_tick().await.unwrap().snapshot_written);

        // 12:30 passed between the two ticks
        f.clock.set(at(12, 32));
        assert!(f.scheduler.run_tick().await.unwrap().snapshot_written);

        f.clock.set(at(12, 33));
        assert!(!f.scheduler.run_tick().await.unwrap().snapshot_written);
        assert_eq!(f.scheduler.state().snapshots_written(), 1);
    }

    #[tokio::test]
    async fn test_tick_after_crossing_hour_sweeps() {
        let f = fixture(seeded(), SchedulerConfig::default());
        f.clock.set(at(12, 58));
        assert!(f.scheduler.run_tick().await.unwrap().cleanup.is_none());

        f.clock.set(at(13, 3));
        let report = f.scheduler.run_tick().await.unwrap();
        assert!(report.cleanup.is_some());
        assert!(report.snapshot_written);
    }

    #[tokio::test]
    async fn test_tick_recomputes_missing_statistics() {
        let f = fixture(seeded(), SchedulerConfig::default());
        assert!(!f.cache.exists(KEY_STATISTICS_TODAY));

        let report = f.scheduler.run_tick().await.unwrap();

        assert!(report.statistics_recomputed);
        assert_eq!(report.realtime_refreshed, 1);
        let cached = f.cache.get(KEY_STATISTICS_TODAY).unwrap();
        assert_eq!(cached["metrics"]["carts"], 3);
        let entry = f.cache.get_entry(KEY_STATISTICS_TODAY).unwrap();
        assert_eq!(entry.ttl_remaining(f.clock.now()), Some(360));
    }

    #[tokio::test]
    async fn test_tick_renews_other_realtime_keys() {
        let config = SchedulerConfig {
            realtime_keys: vec!["ordini:aperti".to_string(), "sale:libere".to_string()],
            ..SchedulerConfig::default()
        };
        let f = fixture(seeded(), config);
        f.cache
            .set("ordini:aperti", json!({"count": 1}), Some(60))
            .unwrap();
        f.clock.advance(chrono::Duration::seconds(50));

        let report = f.scheduler.run_tick().await.unwrap();

        assert!(!report.statistics_recomputed);
        assert_eq!(report.realtime_refreshed, 1);
        assert!(!f.cache.exists(KEY_STATISTICS_TODAY));
        let entry = f.cache.get_entry("ordini:aperti").unwrap();
        assert_eq!(entry.ttl_remaining(f.clock.now()), Some(360));
    }

    #[tokio::test]
    async fn test_snapshot_failure_still_sweeps_then_fails_tick() {
        let f = fixture(Arc::new(Failing), SchedulerConfig::default());
        f.cache.set("stale", json!(1), Some(1)).unwrap();
        f.clock.set(at(13, 0));

        let err = f.scheduler.run_tick().await.unwrap_err();

        assert!(matches!(err, CacheError::SchedulerTick(_)));
        assert!(err.to_string().contains("orders database unreachable"));
        assert_eq!(f.scheduler.state().cleanups_run(), 1);
        assert!(!f.cache.exists("stale"));
        assert!(f.cache.exists(KEY_STATISTICS_TODAY));
    }

    #[tokio::test]
    async fn test_realtime_failure_still_snapshots_then_fails_tick() {
        let f = fixture_with_preload(seeded(), Arc::new(Failing), SchedulerConfig::default());
        f.clock.set(at(12, 30));

        let err = f.scheduler.run_tick().await.unwrap_err();

        assert!(err.to_string().contains("realtime statistics refresh failed"));
        assert_eq!(f.scheduler.state().snapshots_written(), 1);
        assert_eq!(f.scheduler.state().realtime_refreshes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_realtime_ttl_fails_tick() {
        let config = SchedulerConfig {
            realtime_ttl: 0,
            ..SchedulerConfig::default()
        };
        let f = fixture(seeded(), config);

        let err = f.scheduler.run_tick().await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[test]
    fn test_delay_until_next_tick() {
        let five = Duration::from_secs(300);
        assert_eq!(delay_until_next_tick(at(12, 2), five), Duration::from_secs(180));
        assert_eq!(delay_until_next_tick(at(12, 5), five), five);
        let almost = at(12, 5) - chrono::Duration::milliseconds(500);
        assert_eq!(delay_until_next_tick(almost, five), Duration::from_millis(500));
        assert_eq!(
            delay_until_next_tick(at(12, 31), Duration::from_secs(1800)),
            Duration::from_secs(29 * 60)
        );
    }

    #[test]
    fn test_boundary_crossed() {
        assert!(boundary_crossed(None, at(12, 30), 30));
        assert!(!boundary_crossed(None, at(12, 31), 30));
        assert!(boundary_crossed(Some(at(12, 29)), at(12, 30), 30));
        assert!(boundary_crossed(Some(at(12, 28)), at(12, 34), 30));
        assert!(!boundary_crossed(Some(at(12, 30)), at(12, 31), 30));
        assert!(!boundary_crossed(Some(at(12, 30)), at(12, 58), 60));
        assert!(boundary_crossed(Some(at(12, 58)), at(13, 2), 60));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}
