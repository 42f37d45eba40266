//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use defis_core::DefisError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `DEFIS_` prefix (`DEFIS_DATABASE__URL`)
    pub fn new(config_dir: impl Into<String>) -> Result<Self, DefisError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, DefisError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// The previous configuration stays in effect if the new one is invalid.
    pub async fn reload(&self) -> Result<(), DefisError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, DefisError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var("DEFIS_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DEFIS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_defis_error)?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_defis_error)?;
        app_config.app.environment = environment;

        validate_config(&app_config)?;

        Ok(app_config)
    }
}

/// Validates the configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), DefisError> {
    let database = &config.database;

    if database.url.is_empty() {
        return Err(DefisError::configuration("Database URL is required"));
    }
    if let Err(e) = Url::parse(&database.url) {
        return Err(DefisError::configuration(format!("Invalid database URL: {}", e)));
    }
    if database.ping_interval_secs == 0 {
        return Err(DefisError::configuration("database.ping_interval_secs must be positive"));
    }
    if database.error_threshold == 0 {
        return Err(DefisError::configuration("database.error_threshold must be positive"));
    }
    if database.reconnect.max_attempts == 0 {
        return Err(DefisError::configuration("database.reconnect.max_attempts must be positive"));
    }
    // Written this way so NaN is rejected too
    if !(database.reconnect.backoff_factor >= 1.0) {
        return Err(DefisError::configuration("database.reconnect.backoff_factor must be >= 1.0"));
    }
    if database.reconnect.max_delay_ms < database.reconnect.base_delay_ms {
        warn!("database.reconnect.max_delay_ms is below base_delay_ms; every delay will be capped");
    }

    if config.observability.parsed_log_format().is_none() {
        return Err(DefisError::configuration(format!(
            "Unknown log format '{}'",
            config.observability.log_format
        )));
    }

    if config.cache.default_ttl_secs == 0 {
        warn!("cache.default_ttl_secs is 0; entries without an explicit TTL expire immediately");
    }

    Ok(())
}

fn config_error_to_defis_error(err: ConfigError) -> DefisError {
    DefisError::Configuration(err.to_string())
}
