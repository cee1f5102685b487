//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    bulk_get_handler, bulk_remove_handler, bulk_set_handler, cleanup_handler, compact_handler,
    exists_handler, get_handler, get_snapshot_handler, health_handler, info_handler,
    list_snapshots_handler, preload_handler, refresh_handler, remove_handler,
    remove_snapshot_handler, scheduler_status_handler, set_handler, snapshot_validity_handler,
    upsert_snapshot_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/cache", cache_routes())
        .nest("/statisticheCache", snapshot_routes())
        .route("/scheduler/status", get(scheduler_status_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/get/:key", get(get_handler))
        .route("/set/:key", post(set_handler))
        .route("/remove/:key", delete(remove_handler))
        .route("/exists/:key", get(exists_handler))
        .route("/refresh/:key", post(refresh_handler))
        .route("/bulk/get", post(bulk_get_handler))
        .route("/bulk/set", post(bulk_set_handler))
        .route("/bulk/remove", post(bulk_remove_handler))
        .route("/info", get(info_handler))
        .route("/cleanup", post(cleanup_handler))
        .route("/compact", post(compact_handler))
        .route("/preload/:target", post(preload_handler))
        .route("/health", get(health_handler))
}

fn snapshot_routes() -> Router<AppState> {
    Router::new()
        .route("/aggiorna", post(upsert_snapshot_handler))
        .route("/:type", get(list_snapshots_handler))
        .route(
            "/:type/:period",
            get(get_snapshot_handler).delete(remove_snapshot_handler),
        )
        .route("/:type/:period/valid", get(snapshot_validity_handler))
}
