//! API Handlers
//!
//! HTTP request handlers for the cache, snapshot and scheduler endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde_json::Value;

use crate::cache::{
    BulkGetResult, BulkRemoveResult, BulkSetResult, CacheInfo, CleanupReport, JsonCache,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    BulkKeysRequest, BulkSetRequest, ExistsResponse, GetResponse, HealthResponse,
    OperationResponse, PreloadAllResponse, RefreshRequest, SetRequest, SnapshotUpsertRequest,
    ValidityQuery, ValidityResponse,
};
use crate::preload::{PreloadReport, PreloadRoutine, PreloadSources, Preloader};
use crate::snapshot::{SnapshotStore, StatisticsSnapshot};
use crate::tasks::{SchedulerState, SchedulerStatus};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<JsonCache>,
    pub snapshots: Arc<SnapshotStore>,
    pub preloader: Arc<Preloader>,
    /// Counters published by the background scheduler
    pub scheduler: Arc<SchedulerState>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Builds fresh stores from configuration, wired to the system clock.
    ///
    /// The returned state carries an idle [`SchedulerState`]; replace it with
    /// the running scheduler's handle once spawned.
    pub fn from_config(config: &Config, sources: PreloadSources) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(JsonCache::with_clock(
            config.max_entries,
            config.max_value_size,
            clock.clone(),
        ));
        let preloader = Arc::new(Preloader::new(
            cache.clone(),
            sources,
            config.preload_ttls,
            clock.clone(),
        ));

        Self {
            cache,
            snapshots: Arc::new(SnapshotStore::with_clock(clock.clone())),
            preloader,
            scheduler: Arc::new(SchedulerState::new()),
            clock,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<SchedulerState>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

// == Entry Store ==

/// Handler for GET /cache/get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let entry = state.cache.get_entry(&key)?;
    let ttl_remaining = entry.ttl_remaining(state.cache.now());

    Ok(Json(GetResponse {
        key,
        value: entry.value,
        ttl_remaining,
    }))
}

/// Handler for POST /cache/set/:key
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<OperationResponse>> {
    state.cache.set(key.as_str(), req.value, req.ttl)?;

    Ok(Json(OperationResponse::ok(format!(
        "Key '{}' set successfully",
        key
    ))))
}

/// Handler for DELETE /cache/remove/:key
///
/// Removing an absent key still succeeds.
pub async fn remove_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<OperationResponse>> {
    let message = if state.cache.remove(&key)? {
        format!("Key '{}' removed", key)
    } else {
        format!("Key '{}' was not present", key)
    };

    Ok(Json(OperationResponse::ok(message)))
}

/// Handler for GET /cache/exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<ExistsResponse> {
    let exists = state.cache.exists(&key);
    Json(ExistsResponse { key, exists })
}

/// Handler for POST /cache/refresh/:key
///
/// An empty body refreshes to "never expires". Any other body must be a
/// valid [`RefreshRequest`], with or without a JSON content type.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<OperationResponse>> {
    let ttl = parse_refresh_body(&body)?.ttl;

    if !state.cache.refresh(&key, ttl)? {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(OperationResponse::ok(format!(
        "Key '{}' refreshed",
        key
    ))))
}

fn parse_refresh_body(body: &[u8]) -> Result<RefreshRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RefreshRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| CacheError::InvalidArgument(format!("Invalid refresh body: {}", err)))
}

// == Bulk ==

/// Handler for POST /cache/bulk/get
pub async fn bulk_get_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkKeysRequest>,
) -> Result<Json<BulkGetResult<Value>>> {
    Ok(Json(state.cache.get_bulk(req.keys.as_slice())?))
}

/// Handler for POST /cache/bulk/set
pub async fn bulk_set_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkSetRequest>,
) -> Result<Json<BulkSetResult>> {
    Ok(Json(state.cache.set_bulk(req.values, req.ttl)?))
}

/// Handler for POST /cache/bulk/remove
pub async fn bulk_remove_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkKeysRequest>,
) -> Result<Json<BulkRemoveResult>> {
    Ok(Json(state.cache.remove_bulk(req.keys.as_slice())?))
}

// == Maintenance ==

/// Handler for GET /cache/info
pub async fn info_handler(State(state): State<AppState>) -> Json<CacheInfo> {
    Json(state.cache.info())
}

/// Handler for POST /cache/cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupReport> {
    Json(state.cache.cleanup_expired())
}

/// Handler for POST /cache/compact
pub async fn compact_handler(State(state): State<AppState>) -> Json<OperationResponse> {
    let retained = state.cache.compact();
    Json(OperationResponse::ok(format!(
        "Compacted, {} entries retained",
        retained
    )))
}

/// Handler for POST /cache/preload/:target
///
/// `target` is a routine name or `all`. A single routine that fails maps to
/// 502; `all` answers 200 unless every routine failed.
pub async fn preload_handler(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Response> {
    if target == "all" {
        let report = state.preloader.preload_common_data().await;
        let status = match &report {
            PreloadReport::TotalFailure { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::OK,
        };
        let body = PreloadAllResponse {
            success: report.is_complete(),
            report,
        };
        return Ok((status, Json(body)).into_response());
    }

    let routine: PreloadRoutine = target.parse()?;
    let message = state.preloader.run(routine).await?;
    Ok(Json(OperationResponse::ok(message)).into_response())
}

/// Handler for GET /cache/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = state.clock.now();
    Json(HealthResponse::new(
        now,
        state.cache.len(),
        state.snapshots.len(),
        state.scheduler.status(now),
    ))
}

// == Statistics Snapshots ==

/// Handler for GET /statisticheCache/:type
pub async fn list_snapshots_handler(
    State(state): State<AppState>,
    Path(statistic_type): Path<String>,
) -> Result<Json<Vec<StatisticsSnapshot>>> {
    Ok(Json(state.snapshots.list_by_type(&statistic_type)?))
}

/// Handler for GET /statisticheCache/:type/:period
pub async fn get_snapshot_handler(
    State(state): State<AppState>,
    Path((statistic_type, period)): Path<(String, String)>,
) -> Result<Json<StatisticsSnapshot>> {
    state
        .snapshots
        .get_by_type_and_period(&statistic_type, &period)?
        .map(Json)
        .ok_or_else(|| CacheError::NotFound(format!("{}/{}", statistic_type, period)))
}

/// Handler for GET /statisticheCache/:type/:period/valid
pub async fn snapshot_validity_handler(
    State(state): State<AppState>,
    Path((statistic_type, period)): Path<(String, String)>,
    Query(query): Query<ValidityQuery>,
) -> Result<Json<ValidityResponse>> {
    let window = Duration::try_minutes(query.window_minutes).ok_or_else(|| {
        CacheError::InvalidArgument(format!(
            "Validity window out of range: {} minutes",
            query.window_minutes
        ))
    })?;
    let valid = state.snapshots.is_valid(&statistic_type, &period, window)?;

    Ok(Json(ValidityResponse {
        statistic_type,
        period,
        window_minutes: query.window_minutes,
        valid,
    }))
}

/// Handler for POST /statisticheCache/aggiorna
pub async fn upsert_snapshot_handler(
    State(state): State<AppState>,
    Json(req): Json<SnapshotUpsertRequest>,
) -> Result<Json<StatisticsSnapshot>> {
    let snapshot = state
        .snapshots
        .upsert(&req.statistic_type, &req.period, req.metrics)?;
    Ok(Json(snapshot))
}

/// Handler for DELETE /statisticheCache/:type/:period
pub async fn remove_snapshot_handler(
    State(state): State<AppState>,
    Path((statistic_type, period)): Path<(String, String)>,
) -> Result<Json<OperationResponse>> {
    let response = if state.snapshots.remove(&statistic_type, &period)? {
        OperationResponse::ok(format!("Snapshot {}/{} removed", statistic_type, period))
    } else {
        OperationResponse::failed(format!(
            "Snapshot {}/{} was not present",
            statistic_type, period
        ))
    };
    Ok(Json(response))
}

// == Scheduler ==

/// Handler for GET /scheduler/status
pub async fn scheduler_status_handler(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status(state.clock.now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preload::{InMemorySources, SeedData};
    use serde_json::json;

    fn test_state() -> AppState {
        let sources = Arc::new(InMemorySources::new(SeedData {
            menu: json!([{"id": 1, "nome": "Margherita"}]),
            ..SeedData::default()
        }));
        AppState::from_config(&Config::default(), PreloadSources::from_shared(sources))
    }

    fn set_request(value: Value, ttl: Option<u64>) -> Json<SetRequest> {
        Json(SetRequest { value, ttl })
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let result = set_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            set_request(json!({"a": 1}), Some(60)),
        )
        .await;
        assert!(result.is_ok());

        let response = get_handler(State(state.clone()), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"a": 1}));
        assert_eq!(response.ttl_remaining, Some(60));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let result = get_handler(State(test_state()), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_absent_key_succeeds() {
        let response = remove_handler(State(test_state()), Path("ghost".to_string()))
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_refresh_absent_key_is_not_found() {
        let result =
            refresh_handler(State(test_state()), Path("ghost".to_string()), Bytes::new()).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refresh_without_body_clears_ttl() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("k".to_string()),
            set_request(json!(1), Some(5)),
        )
        .await
        .unwrap();

        refresh_handler(State(state.clone()), Path("k".to_string()), Bytes::new())
            .await
            .unwrap();

        let response = get_handler(State(state), Path("k".to_string()))
            .await
            .unwrap();
        assert_eq!(response.ttl_remaining, None);
    }

    #[tokio::test]
    async fn test_refresh_malformed_body_keeps_ttl() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("k".to_string()),
            set_request(json!(1), Some(5)),
        )
        .await
        .unwrap();

        for body in [r#"{"ttl": -5}"#, "{not json", r#"{"ttl": "soon"}"#] {
            let result = refresh_handler(
                State(state.clone()),
                Path("k".to_string()),
                Bytes::from_static(body.as_bytes()),
            )
            .await;
            assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
        }

        let response = get_handler(State(state), Path("k".to_string()))
            .await
            .unwrap();
        // Still expiring, not turned into "never expires"
        assert!(response.ttl_remaining.is_some());
    }

    #[test]
    fn test_parse_refresh_body() {
        assert_eq!(parse_refresh_body(b"").unwrap().ttl, None);
        assert_eq!(parse_refresh_body(b" \n").unwrap().ttl, None);
        assert_eq!(parse_refresh_body(b"{}").unwrap().ttl, None);
        assert_eq!(parse_refresh_body(br#"{"ttl": 30}"#).unwrap().ttl, Some(30));
        assert!(parse_refresh_body(b"null").is_err());
    }

    #[tokio::test]
    async fn test_set_invalid_ttl() {
        let result = set_handler(
            State(test_state()),
            Path("k".to_string()),
            set_request(json!(1), Some(0)),
        )
        .await;
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_preload_single_routine() {
        let state = test_state();
        preload_handler(State(state.clone()), Path("menu".to_string()))
            .await
            .unwrap();

        assert!(state.cache.exists("menu:articoli"));
    }

    #[tokio::test]
    async fn test_preload_unknown_target() {
        let result = preload_handler(State(test_state()), Path("dolci".to_string())).await;
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_snapshot_validity_rejects_zero_window() {
        let state = test_state();
        upsert_snapshot_handler(
            State(state.clone()),
            Json(SnapshotUpsertRequest {
                statistic_type: "cart".to_string(),
                period: "today".to_string(),
                metrics: json!({"abandoned": 1}),
            }),
        )
        .await
        .unwrap();

        let result = snapshot_validity_handler(
            State(state),
            Path(("cart".to_string(), "today".to_string())),
            Query(ValidityQuery { window_minutes: 0 }),
        )
        .await;
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.entry_count, 0);
    }
}
