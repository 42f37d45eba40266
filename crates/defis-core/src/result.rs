//! Result type aliases for LPT Défis.

use crate::DefisError;

/// A specialized `Result` type for Défis operations.
pub type DefisResult<T> = Result<T, DefisError>;
