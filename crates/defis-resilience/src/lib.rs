//! # Défis Resilience
//!
//! Resilience patterns for LPT Défis.
//! Provides the reconnection backoff policy and timeout helpers.

pub mod backoff;
pub mod timeout;

pub use backoff::*;
pub use timeout::*;
