//! Seams between the resilient wrapper and a concrete database driver.

use async_trait::async_trait;
use defis_core::DefisResult;

/// A live client handle, typically a connection pool.
#[async_trait]
pub trait DatabaseClient: Send + Sync + 'static {
    /// Runs a trivial round trip (e.g. `SELECT 1`).
    async fn ping(&self) -> DefisResult<()>;

    /// Closes the handle. Must tolerate being called on a closed handle.
    async fn close(&self);
}

/// Factory establishing new client handles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The client type produced by this connector.
    type Client: DatabaseClient;

    /// Opens a new client handle.
    async fn connect(&self) -> DefisResult<Self::Client>;

    /// Short description for logs (never includes credentials).
    fn describe(&self) -> String {
        "database".to_string()
    }
}
