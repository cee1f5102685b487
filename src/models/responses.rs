//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::preload::PreloadReport;
use crate::tasks::SchedulerStatus;

/// Response body for `GET /cache/get/:key`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
    /// Seconds until expiry; `null` for entries that never expire
    pub ttl_remaining: Option<u64>,
}

/// Generic `{success, message}` outcome of a mutating operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Response body for `GET /cache/exists/:key`
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for `POST /cache/preload/all`
#[derive(Debug, Clone, Serialize)]
pub struct PreloadAllResponse {
    pub success: bool,
    pub report: PreloadReport,
}

/// Response body for `GET /statisticheCache/:type/:period/valid`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityResponse {
    pub statistic_type: String,
    pub period: String,
    pub window_minutes: i64,
    pub valid: bool,
}

/// Response body for `GET /cache/health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the last scheduler tick failed
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub entry_count: usize,
    pub snapshot_count: usize,
    pub scheduler: SchedulerStatus,
}

impl HealthResponse {
    pub fn new(
        timestamp: DateTime<Utc>,
        entry_count: usize,
        snapshot_count: usize,
        scheduler: SchedulerStatus,
    ) -> Self {
        let status = if scheduler.last_tick_failed {
            "degraded"
        } else {
            "healthy"
        };
        Self {
            status: status.to_string(),
            timestamp,
            entry_count,
            snapshot_count,
            scheduler,
        }
    }
}
