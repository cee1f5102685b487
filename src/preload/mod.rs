//! Preload Module
//!
//! Warm-up routines that populate the entry store with well-known domain
//! keys (menu, prices, statistics, configuration).

mod preloader;
mod sources;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CacheError;

pub use preloader::{PreloadReport, PreloadSources, PreloadTtls, Preloader, RoutineResult};
pub use sources::{
    ConfigurationSource, InMemorySources, MenuSource, PricingSource, SeedData, StatisticsSource,
};

// == Domain Keys ==
pub const KEY_MENU: &str = "menu:articoli";
pub const KEY_STATISTICS_TODAY: &str = "statistiche:oggi";
pub const KEY_PRICE_INDEX: &str = "prezzi:indice";
pub const PRICE_KEY_PREFIX: &str = "prezzi:";
pub const CONFIG_KEY_PREFIX: &str = "config:";

// == Preload Routine ==
/// A named warm-up routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadRoutine {
    Menu,
    Statistiche,
    Prezzi,
    Configurazioni,
}

impl PreloadRoutine {
    /// Every routine, in the order `preload_common_data` reports them.
    pub const ALL: [PreloadRoutine; 4] = [
        PreloadRoutine::Menu,
        PreloadRoutine::Statistiche,
        PreloadRoutine::Prezzi,
        PreloadRoutine::Configurazioni,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadRoutine::Menu => "menu",
            PreloadRoutine::Statistiche => "statistiche",
            PreloadRoutine::Prezzi => "prezzi",
            PreloadRoutine::Configurazioni => "configurazioni",
        }
    }
}

impl fmt::Display for PreloadRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreloadRoutine {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreloadRoutine::ALL
            .into_iter()
            .find(|routine| routine.as_str() == s)
            .ok_or_else(|| CacheError::InvalidArgument(format!("Unknown preload routine: {}", s)))
    }
}

/// Failure of one routine inside an aggregated preload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadFailure {
    pub routine: PreloadRoutine,
    pub reason: String,
}

impl From<PreloadFailure> for CacheError {
    fn from(failure: PreloadFailure) -> Self {
        CacheError::PreloadFailure {
            routine: failure.routine.to_string(),
            reason: failure.reason,
        }
    }
}
