//! Ristorante Cache - caching core of a restaurant backend
//!
//! Serves the entry store, snapshot store and scheduler state over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ristorante_cache::api::{create_router, AppState};
use ristorante_cache::preload::{InMemorySources, PreloadSources};
use ristorante_cache::{CacheScheduler, Config, SchedulerDeps};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build stores, data sources and the preloader
/// 4. Optionally warm the cache
/// 5. Bind the listener, then start the background scheduler
/// 6. Serve HTTP until SIGINT/SIGTERM or a serve error, then stop the scheduler
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ristorante_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ristorante Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, port={}, tick={}s, backoff={}s",
        config.max_entries,
        config.server_port,
        config.scheduler_tick_secs,
        config.scheduler_backoff_secs
    );

    let sources = match &config.seed_file {
        Some(path) => Arc::new(InMemorySources::from_file(path)?),
        None => {
            warn!("No SEED_FILE configured, data sources start empty");
            Arc::new(InMemorySources::default())
        }
    };

    let state = AppState::from_config(&config, PreloadSources::from_shared(sources.clone()));

    if config.preload_on_startup {
        let report = state.preloader.preload_common_data().await;
        if report.is_complete() {
            info!("Startup preload complete");
        } else {
            warn!(
                "Startup preload finished with {} failed routines",
                report.failures().len()
            );
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    let cancel = CancellationToken::new();
    let scheduler = CacheScheduler::new(
        SchedulerDeps {
            cache: state.cache.clone(),
            snapshots: state.snapshots.clone(),
            preloader: state.preloader.clone(),
            statistics: sources,
            clock: state.clock.clone(),
        },
        config.scheduler(),
        cancel.clone(),
    );
    let state = state.with_scheduler(scheduler.state());
    let scheduler = scheduler.start();

    let app = create_router(state);

    // The scheduler is stopped even when serving fails
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await;

    scheduler
        .shutdown()
        .await
        .context("scheduler task did not stop cleanly")?;
    served.context("serving HTTP")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then cancels background work.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
