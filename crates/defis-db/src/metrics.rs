//! Prometheus metrics for the resilient connection.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names for the database layer.
pub mod names {
    /// Queries executed through the wrapper.
    pub const DB_QUERIES_TOTAL: &str = "defis_db_queries_total";
    /// Queries that failed, labelled by `kind` (`connectivity` or `query`).
    pub const DB_QUERY_FAILURES_TOTAL: &str = "defis_db_query_failures_total";
    /// Reconnection attempts, labelled by `outcome`.
    pub const DB_RECONNECT_ATTEMPTS_TOTAL: &str = "defis_db_reconnect_attempts_total";
    /// Connections replaced because of their age.
    pub const DB_RECYCLED_TOTAL: &str = "defis_db_recycled_total";
    /// 1 when healthy, 0 otherwise.
    pub const DB_HEALTHY: &str = "defis_db_healthy";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::DB_QUERIES_TOTAL, "Queries executed through the resilient connection");
    describe_counter!(names::DB_QUERY_FAILURES_TOTAL, "Failed queries by failure kind");
    describe_counter!(names::DB_RECONNECT_ATTEMPTS_TOTAL, "Reconnection attempts by outcome");
    describe_counter!(names::DB_RECYCLED_TOTAL, "Connections recycled after reaching their maximum age");
    describe_gauge!(names::DB_HEALTHY, "Whether the database connection is healthy");
}

pub(crate) fn record_query() {
    counter!(names::DB_QUERIES_TOTAL).increment(1);
}

pub(crate) fn record_query_failure(connectivity: bool) {
    let kind = if connectivity { "connectivity" } else { "query" };
    counter!(names::DB_QUERY_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub(crate) fn record_reconnect_attempt(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::DB_RECONNECT_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_recycled() {
    counter!(names::DB_RECYCLED_TOTAL).increment(1);
}

pub(crate) fn set_healthy(healthy: bool) {
    gauge!(names::DB_HEALTHY).set(if healthy { 1.0 } else { 0.0 });
}
