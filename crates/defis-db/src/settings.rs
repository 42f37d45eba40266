//! Tuning of the resilient connection.

use defis_config::DatabaseConfig;
use defis_resilience::BackoffPolicy;
use std::time::Duration;

/// Settings of a [`ResilientConnection`](crate::ResilientConnection).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Interval of the background health check.
    pub ping_interval: Duration,
    /// Age after which a healthy connection is replaced by a fresh one.
    pub max_connection_age: Duration,
    /// Consecutive connectivity errors that start a reconnection.
    pub error_threshold: u32,
    /// Upper bound for a single connect attempt or ping.
    pub connect_timeout: Duration,
    /// Backoff between failed reconnection attempts.
    pub backoff: BackoffPolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            max_connection_age: Duration::from_secs(3600),
            error_threshold: 3,
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl From<&DatabaseConfig> for ConnectionSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            max_connection_age: config.max_connection_age(),
            error_threshold: config.error_threshold.max(1),
            connect_timeout: config.connect_timeout(),
            backoff: BackoffPolicy::from(&config.reconnect),
        }
    }
}
