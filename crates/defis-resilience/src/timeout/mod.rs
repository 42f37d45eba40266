//! Timeout wrapper for async operations.

use defis_core::DefisError;
use std::future::Future;
use std::time::Duration;

/// Wraps an async operation with a timeout.
pub async fn with_timeout<Fut, T>(duration: Duration, fut: Fut) -> Result<T, DefisError>
where
    Fut: Future<Output = Result<T, DefisError>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| DefisError::Timeout(format!("Operation timed out after {:?}", duration)))?
}
