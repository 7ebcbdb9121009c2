//! VoxRelay orchestrator binary

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxrelay_client::{RemoteWorkerClient, Telemetry};
use voxrelay_core::RateLimiter;
use voxrelay_server::{create_router, AppState, StaticLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxrelay_server=debug,voxrelay_client=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting VoxRelay orchestrator");

    let redis_url = std::env::var("REDIS_URL").ok();
    if redis_url.is_none() {
        warn!("REDIS_URL not set; rate limiting and telemetry are disabled");
    }

    let limiter = match RateLimiter::connect(redis_url.as_deref()).await {
        Ok(limiter) => limiter,
        Err(e) => {
            warn!("Failed to connect rate limiter, failing open: {e}");
            RateLimiter::disabled()
        }
    };
    let telemetry = Telemetry::new(redis_url.as_deref()).await;
    let worker = RemoteWorkerClient::from_env()?;
    if !worker.config().enabled {
        warn!("GPU_WORKER_MODE is not 'remote'; inference dispatch will be refused");
    }

    let state = AppState::new(limiter, worker, Arc::new(StaticLedger::from_env()), telemetry);
    let app = create_router(state);

    let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = match std::env::var("SERVER_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid SERVER_PORT='{}', falling back to 8000", raw);
                8000
            }
        },
        Err(_) => 8000,
    };
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Orchestrator listening on http://{}", addr);

    // Unauthenticated callers are rate limited by peer address, so the
    // router needs the connection info.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
