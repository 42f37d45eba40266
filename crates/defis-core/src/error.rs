//! Unified error type for the cache, connection and configuration layers.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for LPT Défis.
///
/// Database failures are split in two families: connectivity-class errors
/// (the backing store could not be reached) and plain query errors (the store
/// answered, but rejected the statement). Only the former drive the health
/// state machine of the resilient connection.
#[derive(Error, Debug)]
pub enum DefisError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Infrastructure Errors ============
    /// Query rejected by the database (bad statement, constraint, decoding)
    #[error("Database error: {0}")]
    Database(String),

    /// Backing store unreachable, connection reset or refused
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// No usable client handle (wrapper closed or connection dropped)
    #[error("Database connection not available")]
    NotConnected,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DefisError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Connectivity(_) => "CONNECTIVITY_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity<T: Into<String>>(message: T) -> Self {
        Self::Connectivity(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error means the backing store could not be reached.
    ///
    /// Query-level failures such as constraint violations return `false`.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::NotConnected | Self::Timeout(_)
        )
    }

    /// Checks if the client handle itself is gone, which warrants
    /// reconnecting without waiting for the error threshold.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

/// SQLSTATE codes that mean the server is going away or refusing sessions.
#[cfg(feature = "sqlx")]
const CONNECTIVITY_SQLSTATES: &[&str] = &["57P01", "57P02", "57P03", "53300"];

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for DefisError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                Self::Connectivity(err.to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Timeout(err.to_string()),
            sqlx::Error::PoolClosed => Self::NotConnected,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // Class 08 is "connection exception"
                    if code.starts_with("08") || CONNECTIVITY_SQLSTATES.contains(&code.as_ref()) {
                        return Self::Connectivity(db_err.message().to_string());
                    }
                    if code == "23505" {
                        return Self::Conflict(db_err.message().to_string());
                    }
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DefisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error summary, used in health and stats payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorSummary {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&DefisError> for ErrorSummary {
    fn from(error: &DefisError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}
