//! Health state machine types.

use chrono::{DateTime, Utc};
use defis_core::ErrorSummary;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Coarse connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Last query or health check succeeded.
    Healthy,
    /// A connectivity error was observed; queries are still attempted.
    Unhealthy,
    /// A reconnection sequence is in flight.
    Reconnecting,
    /// `cleanup` was called.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Transitions broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connectivity error or failed health check was observed.
    Unhealthy { consecutive_errors: u32 },
    /// A connect attempt is starting (1-based within the current cycle).
    Reconnecting { attempt: u32 },
    /// A connect attempt failed; the next one follows after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
    /// `max_attempts` failures in a row; pausing before a new cycle.
    CooldownStarted { cooldown: Duration },
    /// A new client handle replaced the broken one.
    Reconnected,
    /// A query succeeded while the wrapper was unhealthy.
    Restored,
    /// A healthy connection past its maximum age was replaced.
    Recycled,
    /// The wrapper was cleaned up.
    Closed,
}

/// Mutable health bookkeeping, guarded by the wrapper's mutex.
#[derive(Debug)]
pub(crate) struct HealthState {
    pub(crate) state: ConnectionState,
    pub(crate) consecutive_errors: u32,
    pub(crate) reconnect_attempts: u32,
    pub(crate) total_queries: u64,
    pub(crate) successful_queries: u64,
    pub(crate) failed_queries: u64,
    pub(crate) last_query_at: Option<Instant>,
    pub(crate) last_query_time: Option<DateTime<Utc>>,
    pub(crate) connected_at: Instant,
    pub(crate) connected_since: DateTime<Utc>,
    pub(crate) last_error: Option<ErrorSummary>,
}

impl HealthState {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Healthy,
            consecutive_errors: 0,
            reconnect_attempts: 0,
            total_queries: 0,
            successful_queries: 0,
            failed_queries: 0,
            last_query_at: None,
            last_query_time: None,
            connected_at: Instant::now(),
            connected_since: Utc::now(),
            last_error: None,
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.state == ConnectionState::Healthy
    }

    /// Records a fresh client handle. A closed wrapper stays closed; returns
    /// `false` in that case.
    pub(crate) fn mark_connected(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Healthy;
        self.consecutive_errors = 0;
        self.reconnect_attempts = 0;
        self.connected_at = Instant::now();
        self.connected_since = Utc::now();
        true
    }

    pub(crate) fn touch(&mut self) {
        self.last_query_at = Some(Instant::now());
        self.last_query_time = Some(Utc::now());
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        let success_rate = if self.total_queries == 0 {
            1.0
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        };

        ConnectionStats {
            healthy: self.is_healthy(),
            state: self.state,
            consecutive_errors: self.consecutive_errors,
            total_queries: self.total_queries,
            successful_queries: self.successful_queries,
            failed_queries: self.failed_queries,
            success_rate,
            last_query_time: self.last_query_time,
            reconnect_attempts: self.reconnect_attempts,
            connected_since: self.connected_since,
            last_error: self.last_error.clone(),
        }
    }
}

/// Observability snapshot; reading it has no effect on behavior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    /// Whether the last query or health check succeeded.
    pub healthy: bool,
    /// Current state.
    pub state: ConnectionState,
    /// Connectivity errors since the last success.
    pub consecutive_errors: u32,
    /// Queries executed through the wrapper.
    pub total_queries: u64,
    /// Queries that succeeded.
    pub successful_queries: u64,
    /// Queries that failed, whatever the reason.
    pub failed_queries: u64,
    /// `successful_queries / total_queries`, 1.0 before the first query.
    pub success_rate: f64,
    /// Wall-clock time of the last query.
    pub last_query_time: Option<DateTime<Utc>>,
    /// Failed attempts in the current reconnection cycle.
    pub reconnect_attempts: u32,
    /// When the current client handle was established.
    pub connected_since: DateTime<Utc>,
    /// Last connectivity error observed.
    pub last_error: Option<ErrorSummary>,
}
