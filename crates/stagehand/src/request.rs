//! Request-with-timeout helper for asking collaborators.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Default time a collaborator gets to answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `request`, failing with [`Error::RequestTimeout`] once `timeout`
/// has elapsed.
///
/// # Example
///
/// ```ignore
/// let status = ask_with_timeout(client.open(), Duration::from_secs(5)).await?;
/// ```
pub async fn ask_with_timeout<F, T>(request: F, timeout: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(reply) => Ok(reply),
        Err(_) => {
            warn!(?timeout, "collaborator did not answer in time");
            Err(Error::RequestTimeout { timeout })
        }
    }
}
