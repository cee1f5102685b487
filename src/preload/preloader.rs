//! Preloader
//!
//! Fetches domain data from the sources and writes it into the entry store.
//! Sources are awaited before any write, so no cache lock is held while a
//! repository call is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::sources::{ConfigurationSource, MenuSource, PricingSource, StatisticsSource};
use super::{
    PreloadFailure, PreloadRoutine, CONFIG_KEY_PREFIX, KEY_MENU, KEY_PRICE_INDEX,
    KEY_STATISTICS_TODAY, PRICE_KEY_PREFIX,
};
use crate::cache::{BulkSetResult, JsonCache};
use crate::clock::Clock;

/// Summary message on success, the failing routine and reason otherwise.
pub type RoutineResult = std::result::Result<String, PreloadFailure>;

// == Sources ==
/// The repositories each routine reads from.
#[derive(Clone)]
pub struct PreloadSources {
    pub menu: Arc<dyn MenuSource>,
    pub pricing: Arc<dyn PricingSource>,
    pub configuration: Arc<dyn ConfigurationSource>,
    pub statistics: Arc<dyn StatisticsSource>,
}

impl PreloadSources {
    /// Uses one adapter for every port.
    pub fn from_shared<S>(source: Arc<S>) -> Self
    where
        S: MenuSource + PricingSource + ConfigurationSource + StatisticsSource + 'static,
    {
        Self {
            menu: source.clone(),
            pricing: source.clone(),
            configuration: source.clone(),
            statistics: source,
        }
    }
}

// == TTLs ==
/// TTL in seconds applied by each routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadTtls {
    pub menu: u64,
    pub statistiche: u64,
    pub prezzi: u64,
    pub configurazioni: u64,
}

impl Default for PreloadTtls {
    fn default() -> Self {
        Self {
            menu: 1800,
            statistiche: 300,
            prezzi: 900,
            configurazioni: 3600,
        }
    }
}

// == Preload Report ==
/// Aggregated outcome of running every routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PreloadReport {
    /// Every routine succeeded
    Complete { completed: Vec<PreloadRoutine> },
    /// Some routines failed, the rest were written
    PartialFailure {
        completed: Vec<PreloadRoutine>,
        failures: Vec<PreloadFailure>,
    },
    /// Nothing could be preloaded
    TotalFailure { failures: Vec<PreloadFailure> },
}

impl PreloadReport {
    fn from_outcomes(outcomes: Vec<(PreloadRoutine, RoutineResult)>) -> Self {
        let mut completed = Vec::new();
        let mut failures = Vec::new();
        for (routine, outcome) in outcomes {
            match outcome {
                Ok(_) => completed.push(routine),
                Err(failure) => failures.push(failure),
            }
        }

        match (completed.is_empty(), failures.is_empty()) {
            (_, true) => PreloadReport::Complete { completed },
            (true, false) => PreloadReport::TotalFailure { failures },
            (false, false) => PreloadReport::PartialFailure {
                completed,
                failures,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PreloadReport::Complete { .. })
    }

    /// Routines that failed, if any.
    pub fn failures(&self) -> &[PreloadFailure] {
        match self {
            PreloadReport::Complete { .. } => &[],
            PreloadReport::PartialFailure { failures, .. }
            | PreloadReport::TotalFailure { failures } => failures,
        }
    }
}

// == Preloader ==
pub struct Preloader {
    cache: Arc<JsonCache>,
    sources: PreloadSources,
    ttls: PreloadTtls,
    clock: Arc<dyn Clock>,
}

impl Preloader {
    pub fn new(
        cache: Arc<JsonCache>,
        sources: PreloadSources,
        ttls: PreloadTtls,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            sources,
            ttls,
            clock,
        }
    }

    /// Runs a single routine; `Ok` carries a human-readable summary.
    pub async fn run(&self, routine: PreloadRoutine) -> RoutineResult {
        let outcome = match routine {
            PreloadRoutine::Menu => self.cache_menu().await,
            PreloadRoutine::Statistiche => self.cache_statistiche().await,
            PreloadRoutine::Prezzi => self.cache_prezzi().await,
            PreloadRoutine::Configurazioni => self.cache_configurazioni().await,
        };
        match &outcome {
            Ok(message) => info!("Preload {}: {}", routine, message),
            Err(failure) => warn!("Preload {} failed: {}", routine, failure.reason),
        }
        outcome
    }

    /// Runs every routine; one failing never stops the others.
    pub async fn preload_common_data(&self) -> PreloadReport {
        let (menu, statistiche, prezzi, configurazioni) = tokio::join!(
            self.run(PreloadRoutine::Menu),
            self.run(PreloadRoutine::Statistiche),
            self.run(PreloadRoutine::Prezzi),
            self.run(PreloadRoutine::Configurazioni),
        );

        PreloadReport::from_outcomes(vec![
            (PreloadRoutine::Menu, menu),
            (PreloadRoutine::Statistiche, statistiche),
            (PreloadRoutine::Prezzi, prezzi),
            (PreloadRoutine::Configurazioni, configurazioni),
        ])
    }

    #[instrument(skip(self))]
    pub async fn cache_menu(&self) -> RoutineResult {
        let routine = PreloadRoutine::Menu;
        let menu = self
            .sources
            .menu
            .menu()
            .await
            .map_err(|err| failure(routine, format!("{:#}", err)))?;

        self.cache
            .set(KEY_MENU, menu, Some(self.ttls.menu))
            .map_err(|err| failure(routine, err.to_string()))?;
        Ok(format!("Cached {}", KEY_MENU))
    }

    #[instrument(skip(self))]
    pub async fn cache_statistiche(&self) -> RoutineResult {
        let routine = PreloadRoutine::Statistiche;
        let today = self.clock.now().date_naive();
        let metrics = self
            .sources
            .statistics
            .daily_metrics(today)
            .await
            .map_err(|err| failure(routine, format!("{:#}", err)))?;

        self.cache
            .set(KEY_STATISTICS_TODAY, metrics, Some(self.ttls.statistiche))
            .map_err(|err| failure(routine, err.to_string()))?;
        Ok(format!("Cached statistics for {}", today))
    }

    #[instrument(skip(self))]
    pub async fn cache_prezzi(&self) -> RoutineResult {
        let routine = PreloadRoutine::Prezzi;
        let prices = self
            .sources
            .pricing
            .prices()
            .await
            .map_err(|err| failure(routine, format!("{:#}", err)))?;

        let index: Vec<String> = prices.keys().cloned().collect();
        let mut result = self.write_prefixed(routine, PRICE_KEY_PREFIX, prices, self.ttls.prezzi)?;

        match self
            .cache
            .set(KEY_PRICE_INDEX, Value::from(index), Some(self.ttls.prezzi))
        {
            Ok(()) => result.succeeded.push(KEY_PRICE_INDEX.to_string()),
            Err(err) => {
                result.failed.insert(KEY_PRICE_INDEX.to_string(), err.to_string());
            }
        }
        summarize(routine, "price", &result)
    }

    #[instrument(skip(self))]
    pub async fn cache_configurazioni(&self) -> RoutineResult {
        let routine = PreloadRoutine::Configurazioni;
        let configurations = self
            .sources
            .configuration
            .configurations()
            .await
            .map_err(|err| failure(routine, format!("{:#}", err)))?;

        let result = self.write_prefixed(
            routine,
            CONFIG_KEY_PREFIX,
            configurations,
            self.ttls.configurazioni,
        )?;
        summarize(routine, "configuration", &result)
    }

    fn write_prefixed(
        &self,
        routine: PreloadRoutine,
        prefix: &str,
        values: BTreeMap<String, Value>,
        ttl: u64,
    ) -> std::result::Result<BulkSetResult, PreloadFailure> {
        let prefixed = values
            .into_iter()
            .map(|(name, value)| (format!("{}{}", prefix, name), value));
        self.cache
            .set_bulk(prefixed, Some(ttl))
            .map_err(|err| failure(routine, err.to_string()))
    }
}

fn failure(routine: PreloadRoutine, reason: String) -> PreloadFailure {
    PreloadFailure { routine, reason }
}

/// A multi-key routine only succeeds when every key was written.
fn summarize(routine: PreloadRoutine, noun: &str, result: &BulkSetResult) -> RoutineResult {
    if result.is_complete() {
        return Ok(format!("Cached {} {} keys", result.succeeded.len(), noun));
    }
    let failed: Vec<String> = result
        .failed
        .iter()
        .map(|(key, reason)| format!("{} ({})", key, reason))
        .collect();
    Err(failure(
        routine,
        format!(
            "{} of {} {} keys failed: {}",
            result.failed.len(),
            result.failed.len() + result.succeeded.len(),
            noun,
            failed.join(", ")
        ),
    ))
}
