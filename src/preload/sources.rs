//! Data Sources
//!
//! Ports for the repositories that feed the caches. The core treats any
//! error they return as a recoverable preload or snapshot failure.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

/// Supplies the menu (articles on sale).
#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn menu(&self) -> anyhow::Result<Value>;
}

/// Supplies current prices keyed by article id.
#[async_trait]
pub trait PricingSource: Send + Sync {
    async fn prices(&self) -> anyhow::Result<BTreeMap<String, Value>>;
}

/// Supplies application settings keyed by name.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    async fn configurations(&self) -> anyhow::Result<BTreeMap<String, Value>>;
}

/// Computes the business metrics for one day (cart statistics and the like).
#[async_trait]
pub trait StatisticsSource: Send + Sync {
    async fn daily_metrics(&self, day: NaiveDate) -> anyhow::Result<Value>;
}

// == Seed Data ==
/// Fixture content served by [`InMemorySources`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub menu: Value,
    pub prices: BTreeMap<String, Value>,
    pub configurations: BTreeMap<String, Value>,
    pub statistics: Value,
}

// == In-Memory Sources ==
/// Serves every port from in-memory seed data.
#[derive(Debug, Default)]
pub struct InMemorySources {
    seed: RwLock<SeedData>,
}

impl InMemorySources {
    pub fn new(seed: SeedData) -> Self {
        Self {
            seed: RwLock::new(seed),
        }
    }

    /// Loads seed data from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        Ok(Self::new(seed))
    }

    /// Swaps the served content.
    pub fn replace(&self, seed: SeedData) {
        *self.seed.write() = seed;
    }
}

#[async_trait]
impl MenuSource for InMemorySources {
    async fn menu(&self) -> anyhow::Result<Value> {
        Ok(self.seed.read().menu.clone())
    }
}

#[async_trait]
impl PricingSource for InMemorySources {
    async fn prices(&self) -> anyhow::Result<BTreeMap<String, Value>> {
        Ok(self.seed.read().prices.clone())
    }
}

#[async_trait]
impl ConfigurationSource for InMemorySources {
    async fn configurations(&self) -> anyhow::Result<BTreeMap<String, Value>> {
        Ok(self.seed.read().configurations.clone())
    }
}

#[async_trait]
impl StatisticsSource for InMemorySources {
    async fn daily_metrics(&self, day: NaiveDate) -> anyhow::Result<Value> {
        Ok(json!({
            "day": day.to_string(),
            "metrics": self.seed.read().statistics.clone(),
        }))
    }
}
