//! # Défis Core
//!
//! Core types shared by every LPT Défis crate: the unified error type,
//! result aliases and logging initialization.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
