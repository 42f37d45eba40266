//! PostgreSQL client built on a SQLx connection pool.

use crate::{Connector, DatabaseClient};
use async_trait::async_trait;
use defis_config::DatabaseConfig;
use defis_core::{DefisError, DefisResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use url::Url;

/// Opens PostgreSQL pools from configuration.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    /// Creates a connector for the configured database.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Client = PgClient;

    async fn connect(&self) -> DefisResult<PgClient> {
        info!("Connecting to PostgreSQL at {}...", self.describe());

        let pool = PgPoolOptions::new()
            .min_connections(self.config.min_connections)
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .idle_timeout(Some(self.config.idle_timeout()))
            .connect(&self.config.url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                DefisError::from(e)
            })?;

        info!("PostgreSQL connection pool established");
        Ok(PgClient { pool })
    }

    fn describe(&self) -> String {
        redact_url(&self.config.url)
    }
}

/// Database pool wrapper.
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
}

impl PgClient {
    /// Wraps a pre-existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatabaseClient for PgClient {
    async fn ping(&self) -> DefisResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

impl std::ops::Deref for PgClient {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl std::fmt::Debug for PgClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgClient")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

/// Strips the credentials of a connection URL.
fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            // Both setters only fail on URLs that cannot hold credentials.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => "<invalid database url>".to_string(),
    }
}
