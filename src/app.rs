use std::sync::Arc;

use axum::Router;
use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::routes::{router, AppState};
use crate::storage::UploadStore;
use crate::stress::{spawn_telemetry_logger, spawn_upload_echo, EchoConfig};
use crate::telemetry::{AllocationLedger, HostProbe, ResourceSampler};

/// Wired application: everything a listener (or a test) needs to serve.
pub struct App {
    pub router: Router,
    pub sampler: Arc<ResourceSampler>,
    pub store: Arc<UploadStore>,
    pub ledger: AllocationLedger,
}

/// Builds the component graph: config → ledger → store → probe → sampler →
/// router. No listener is bound and no background task is spawned here.
pub async fn build(config: &ServerConfig) -> Result<App, Box<dyn std::error::Error>> {
    let ledger = AllocationLedger::new();
    let store = Arc::new(UploadStore::open(&config.upload_dir, &ledger).await?);
    let probe = HostProbe::new(ledger.clone())?;
    let sampler = Arc::new(ResourceSampler::new(probe));

    let state = AppState {
        sampler: Arc::clone(&sampler),
        store: Arc::clone(&store),
    };
    Ok(App {
        router: router(state, config.max_upload_bytes),
        sampler,
        store,
        ledger,
    })
}

/// Runs the server until SIGINT: binds the configured port, starts the
/// telemetry logger and (unless disabled) the self-upload echo loop, then
/// serves until shutdown cancels both tickers.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();
    let app = build(&config).await?;

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let port = listener.local_addr()?.port();
    info!("Server running at http://localhost:{}", port);

    let cancel = CancellationToken::new();
    let logger = spawn_telemetry_logger(
        Arc::clone(&app.sampler),
        config.telemetry_interval,
        cancel.clone(),
    );
    let echo = if config.echo_enabled {
        Some(spawn_upload_echo(
            EchoConfig {
                endpoint: format!("http://127.0.0.1:{}/upload", port),
                period: config.echo_interval,
                payload_bytes: config.echo_payload_bytes,
            },
            app.ledger.register("EchoPayload"),
            cancel.clone(),
        ))
    } else {
        None
    };

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", err);
            }
            info!("shutting down");
            cancel.cancel();
        }
    };
    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown)
        .await?;

    cancel.cancel();
    logger.await?;
    if let Some(echo) = echo {
        echo.await?;
    }
    Ok(())
}
