//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_MAX_VALUE_SIZE;
use crate::preload::{PreloadTtls, KEY_STATISTICS_TODAY};
use crate::tasks::SchedulerConfig;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Maximum encoded size of a single value in bytes
    pub max_value_size: usize,
    /// Seconds between scheduler ticks
    pub scheduler_tick_secs: u64,
    /// Seconds to wait after a failed tick
    pub scheduler_backoff_secs: u64,
    /// Keys whose TTL the scheduler renews on every tick
    pub realtime_keys: Vec<String>,
    /// TTL in seconds given to realtime keys
    pub realtime_ttl_secs: u64,
    /// TTLs used by the preload routines
    pub preload_ttls: PreloadTtls,
    /// Run every preload routine before serving
    pub preload_on_startup: bool,
    /// Optional JSON fixture feeding the in-memory data sources
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `MAX_VALUE_SIZE` - Maximum value size in bytes (default: 1048576)
    /// - `SCHEDULER_TICK_SECS` - Scheduler tick interval, 0 rejected (default: 300)
    /// - `SCHEDULER_BACKOFF_SECS` - Delay after a failed tick, 0 rejected (default: 60)
    /// - `REALTIME_KEYS` - Comma separated realtime keys (default: statistiche:oggi)
    /// - `REALTIME_TTL_SECS` - TTL for realtime keys (default: 360)
    /// - `MENU_TTL_SECS`, `STATISTICHE_TTL_SECS`, `PREZZI_TTL_SECS`,
    ///   `CONFIGURAZIONI_TTL_SECS` - Preload TTLs (defaults: 1800, 300, 900, 3600)
    /// - `PRELOAD_ON_STARTUP` - Warm the cache before serving (default: true)
    /// - `SEED_FILE` - JSON fixture for the in-memory sources (default: none)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            server_port: parse_or(lookup("SERVER_PORT"), defaults.server_port),
            max_entries: parse_or(lookup("MAX_ENTRIES"), defaults.max_entries),
            max_value_size: parse_or(lookup("MAX_VALUE_SIZE"), defaults.max_value_size),
            scheduler_tick_secs: parse_positive_or(
                lookup("SCHEDULER_TICK_SECS"),
                defaults.scheduler_tick_secs,
            ),
            scheduler_backoff_secs: parse_positive_or(
                lookup("SCHEDULER_BACKOFF_SECS"),
                defaults.scheduler_backoff_secs,
            ),
            realtime_keys: lookup("REALTIME_KEYS")
                .map(|raw| split_keys(&raw))
                .unwrap_or(defaults.realtime_keys),
            realtime_ttl_secs: parse_or(lookup("REALTIME_TTL_SECS"), defaults.realtime_ttl_secs),
            preload_ttls: PreloadTtls {
                menu: parse_or(lookup("MENU_TTL_SECS"), defaults.preload_ttls.menu),
                statistiche: parse_or(
                    lookup("STATISTICHE_TTL_SECS"),
                    defaults.preload_ttls.statistiche,
                ),
                prezzi: parse_or(lookup("PREZZI_TTL_SECS"), defaults.preload_ttls.prezzi),
                configurazioni: parse_or(
                    lookup("CONFIGURAZIONI_TTL_SECS"),
                    defaults.preload_ttls.configurazioni,
                ),
            },
            preload_on_startup: parse_or(
                lookup("PRELOAD_ON_STARTUP"),
                defaults.preload_on_startup,
            ),
            seed_file: lookup("SEED_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.scheduler_tick_secs),
            error_backoff: Duration::from_secs(self.scheduler_backoff_secs),
            realtime_keys: self.realtime_keys.clone(),
            realtime_ttl: self.realtime_ttl_secs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            max_entries: 10_000,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            scheduler_tick_secs: 300,
            scheduler_backoff_secs: 60,
            realtime_keys: vec![KEY_STATISTICS_TODAY.to_string()],
            realtime_ttl_secs: 360,
            preload_ttls: PreloadTtls::default(),
            preload_on_startup: true,
            seed_file: None,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Like `parse_or`, also treating zero as malformed.
fn parse_positive_or(raw: Option<String>, default: u64) -> u64 {
    match parse_or(raw, default) {
        0 => default,
        value => value,
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect()
}
