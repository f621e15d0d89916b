//! Timeout constants and async deadline helpers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default bound on a graceful shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between world ticks.
pub const TICK_INTERVAL: Duration = Duration::from_millis(600);

/// Await `future`, failing with [`ProtocolError::Timeout`] after `duration`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Like [`with_timeout_error`], but a `None` deadline waits indefinitely.
pub async fn with_optional_timeout<F, T>(future: F, duration: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        Some(duration) => with_timeout_error(future, duration).await,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expires() {
        let result = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn no_deadline_passes_through() {
        let result = with_optional_timeout(async { Ok(7) }, None).await;
        assert_eq!(result.ok(), Some(7));
    }
}
