//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Request body for `POST /cache/set/:key`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds; absent means the entry never expires
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Request body for `POST /cache/refresh/:key`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Request body for `POST /cache/bulk/get` and `POST /cache/bulk/remove`
#[derive(Debug, Clone, Deserialize)]
pub struct BulkKeysRequest {
    pub keys: Vec<String>,
}

/// Request body for `POST /cache/bulk/set`
#[derive(Debug, Clone, Deserialize)]
pub struct BulkSetRequest {
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Request body for `POST /statisticheCache/aggiorna`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUpsertRequest {
    pub statistic_type: String,
    pub period: String,
    pub metrics: Value,
}

/// Query string for `GET /statisticheCache/:type/:period/valid`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityQuery {
    /// Validity window in minutes
    pub window_minutes: i64,
}
