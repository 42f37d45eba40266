//! Server startup utilities.

use crate::AppContext;
use defis_config::ObservabilityConfig;
use defis_core::{DefisError, DefisResult};
use defis_db::Connector;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    __    ____  ______   ____        _____
   / /   / __ \/_  __/  / __ \___  / __(_)____
  / /   / /_/ / / /    / / / / _ \/ /_/ / ___/
 / /___/ ____/ / /    / /_/ /  __/ __/ (__  )
/_____/_/     /_/    /_____/\___/_/ /_/____/
    "#);
}

/// Prints where the process is connected and what it exposes.
pub fn print_startup_info<C: Connector>(context: &AppContext<C>) {
    let config = context.config();
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Environment: {}", config.app.environment);
    info!("Database:    {}", context.database().target());
    info!("Cache TTL:   {:?}", context.cache().default_ttl());
    if config.observability.metrics_enabled {
        info!("Metrics:     http://{}/metrics", config.observability.metrics_addr);
    }
    info!("{}", separator);
}

/// Installs the Prometheus exporter as the global metrics recorder.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> DefisResult<()> {
    let addr: SocketAddr = config.metrics_addr.parse().map_err(|e| {
        DefisError::configuration(format!("Invalid metrics address '{}': {}", config.metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DefisError::internal(format!("Failed to install Prometheus exporter: {}", e)))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
