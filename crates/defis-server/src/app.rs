//! Application context: the shared components built once at startup.

use defis_cache::{CacheStats, SweeperHandle, TtlCache};
use defis_config::AppConfig;
use defis_core::DefisResult;
use defis_db::{ConnectionSettings, ConnectionStats, Connector, PgConnector, ResilientConnection};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Name of the shared query cache, used in logs and metrics.
pub const QUERY_CACHE: &str = "queries";

/// Components shared by the whole process.
///
/// Built once and handed to consumers explicitly; nothing here is global.
pub struct AppContext<C: Connector = PgConnector> {
    config: AppConfig,
    database: ResilientConnection<C>,
    cache: TtlCache<Value>,
    sweeper: Option<SweeperHandle>,
}

impl AppContext<PgConnector> {
    /// Connects to Postgres and assembles the context.
    pub async fn build(config: AppConfig) -> DefisResult<Self> {
        let connector = PgConnector::new(config.database.clone());
        let settings = ConnectionSettings::from(&config.database);
        let database = ResilientConnection::connect(connector, settings).await?;
        Ok(Self::assemble(config, database))
    }
}

impl<C: Connector> AppContext<C> {
    /// Assembles the context around an established connection.
    ///
    /// Starts the database health monitor and, when configured, the cache
    /// sweeper.
    pub fn assemble(config: AppConfig, database: ResilientConnection<C>) -> Self {
        defis_db::metrics::register_metrics();
        defis_cache::metrics::register_metrics();

        database.start_health_monitor();

        let cache = TtlCache::from_config(QUERY_CACHE, &config.cache);
        let sweeper = config.cache.sweep_interval().map(|interval| {
            info!("Cache sweeper running every {:?}", interval);
            cache.spawn_sweeper(interval)
        });

        Self {
            config,
            database,
            cache,
            sweeper,
        }
    }

    /// Returns the configuration the context was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the resilient database connection.
    pub fn database(&self) -> &ResilientConnection<C> {
        &self.database
    }

    /// Returns the shared query cache.
    pub fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    /// Snapshot of database and cache health.
    pub fn health(&self) -> HealthReport {
        let database = self.database.stats();
        HealthReport {
            status: if database.healthy { "ok" } else { "degraded" },
            database,
            cache: self.cache.stats(),
        }
    }

    /// Stops background work and closes the database connection.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        self.database.cleanup().await;
        info!("Application context shut down");
    }
}

/// Health payload exposed to operators.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `ok` when the database is healthy, `degraded` otherwise.
    pub status: &'static str,
    pub database: ConnectionStats,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use defis_cache::CacheOptions;
    use defis_config::CacheConfig;
    use defis_db::{ConnectionState, DatabaseClient};
    use std::time::Duration;

    struct StubClient;

    #[async_trait]
    impl DatabaseClient for StubClient {
        async fn ping(&self) -> DefisResult<()> {
            Ok(())
        }

        async fn close(&self) {}
    }

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        type Client = StubClient;

        async fn connect(&self) -> DefisResult<StubClient> {
            Ok(StubClient)
        }
    }

    async fn context(config: AppConfig) -> AppContext<StubConnector> {
        let settings = ConnectionSettings::from(&config.database);
        let database = ResilientConnection::connect(StubConnector, settings).await.unwrap();
        AppContext::assemble(config, database)
    }

    #[tokio::test(start_paused = true)]
    async fn test_assemble_uses_configured_ttl() {
        let mut config = AppConfig::default();
        config.cache = CacheConfig {
            default_ttl_secs: 42,
            sweep_interval_secs: Some(10),
        };

        let ctx = context(config).await;
        assert_eq!(ctx.cache().default_ttl(), Duration::from_secs(42));
        assert_eq!(ctx.cache().name(), QUERY_CACHE);
        assert!(ctx.sweeper.is_some());
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_report() {
        let ctx = context(AppConfig::default()).await;
        ctx.cache().set("k", Value::from(1), &CacheOptions::default());

        let report = ctx.health();
        assert_eq!(report.status, "ok");
        assert_eq!(report.cache.total_entries, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["database"]["state"], "healthy");
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_database() {
        let ctx = context(AppConfig::default()).await;
        let database = ctx.database().clone();

        ctx.shutdown().await;
        assert_eq!(database.state(), ConnectionState::Closed);
    }
}
