//! # Défis DB
//!
//! Database connection wrapper that detects connectivity loss and repairs it
//! in the background.
//!
//! Queries go through [`ResilientConnection::execute`]. Connectivity-class
//! failures move the wrapper to `Unhealthy` and, past a threshold, start a
//! single reconnection sequence with exponential backoff. Query errors such
//! as constraint violations are returned untouched and leave the health state
//! alone.

mod client;
pub mod metrics;
mod monitor;
mod postgres;
mod resilient;
mod settings;
mod state;

pub use client::{Connector, DatabaseClient};
pub use postgres::{PgClient, PgConnector};
pub use resilient::ResilientConnection;
pub use settings::ConnectionSettings;
pub use state::{ConnectionEvent, ConnectionState, ConnectionStats};
