//! Actions OIDC Proxy
//!
//! Forward proxy admitting CONNECT tunnels for CI workflows that present a
//! valid identity token.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Warn about allow-lists left at the wildcard default
//! 3. Optionally start the Prometheus exporter
//! 4. Bind the listener and serve until SIGINT/SIGTERM
//! 5. Wait out the drain period, then exit

use oidc_proxy::config::Config;
use oidc_proxy::observability::metrics::init_metrics_exporter;
use oidc_proxy::routes::GatewayState;
use oidc_proxy::server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_proxy=info,proxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Actions OIDC Proxy");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address(),
        jwks_url = %config.jwks_url,
        jwks_timeout_seconds = config.jwks_timeout_seconds,
        log_claim_values = config.log_claim_values,
        "Configuration loaded successfully"
    );

    let wildcards = config.wildcard_dimensions();
    if wildcards.len() == 4 {
        warn!("All allow-lists are '*': any workflow may tunnel to any host");
    } else if !wildcards.is_empty() {
        warn!(dimensions = ?wildcards, "Some allow-lists accept any value");
    }

    // Metrics exporter on its own listener
    if let Some(metrics_address) = &config.metrics_address {
        let addr: SocketAddr = metrics_address.parse().map_err(|e| {
            error!("Invalid metrics address: {}", e);
            e
        })?;
        init_metrics_exporter(addr).map_err(|e| {
            error!("Failed to start metrics exporter: {}", e);
            e
        })?;
        info!("Metrics exporter listening on {}", addr);
    }

    let state = Arc::new(GatewayState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(|e| {
            error!("Failed to bind {}: {}", config.bind_address(), e);
            e
        })?;

    info!("Actions OIDC Proxy listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let server_handle = tokio::spawn(server::serve(listener, state, shutdown.clone()));

    shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    // Graceful shutdown drain period
    if config.drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", config.drain_seconds);
        tokio::time::sleep(Duration::from_secs(config.drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (ACTIONS_OIDC_PROXY_DRAIN_SECONDS=0)");
    }

    info!("Actions OIDC Proxy shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
