//! # LPT Défis Server
//!
//! Loads configuration, sets up logging and metrics, connects to the
//! database and runs until Ctrl+C or SIGTERM.

use defis_config::ConfigLoader;
use defis_core::telemetry::init_logging;
use defis_core::DefisResult;
use defis_server::startup::{install_metrics_exporter, print_banner, print_startup_info, shutdown_signal};
use defis_server::AppContext;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let loader = match ConfigLoader::from_default_location() {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(loader).await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run(loader: ConfigLoader) -> DefisResult<()> {
    let config = loader.get().await;
    init_logging(&config.observability.logging())?;

    print_banner();
    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        install_metrics_exporter(&config.observability)?;
    }

    let context = AppContext::build(config).await?;
    print_startup_info(&context);

    shutdown_signal().await;

    context.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}
