//! # Défis Server Library
//!
//! Builds the process-wide components (resilient database connection, shared
//! query cache, metrics) and tears them down on shutdown.

pub mod app;
pub mod startup;

pub use app::{AppContext, HealthReport, QUERY_CACHE};
