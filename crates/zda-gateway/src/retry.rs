//! Retry contract for network-bound operations
//!
//! Each attempt runs under its own timeout-bounded child token; a
//! cancelled parent aborts the sequence at the next check.

use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-attempt timeout for ZCL and ZDO requests
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempts made before surfacing the last error
pub const DEFAULT_NETWORK_RETRIES: u32 = 5;

/// Run `operation` up to `attempts` times, each bounded by
/// `attempt_timeout`. Returns the first success or the last error; a
/// timed-out attempt counts as `ContextExpired`.
pub async fn retry<T, F, Fut>(
    ctx: &CancellationToken,
    attempt_timeout: Duration,
    attempts: u32,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut last_error = GatewayError::ContextExpired;

    for _ in 0..attempts {
        if ctx.is_cancelled() {
            return Err(GatewayError::ContextExpired);
        }

        let attempt = ctx.child_token();
        let outcome = tokio::time::timeout(attempt_timeout, operation(attempt.clone())).await;
        attempt.cancel();

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if ctx.is_cancelled() {
                    return Err(GatewayError::ContextExpired);
                }
                last_error = err;
            }
            Err(_) => last_error = GatewayError::ContextExpired,
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let ctx = CancellationToken::new();
        let result = retry(&ctx, Duration::from_millis(50), 3, |_| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result = retry(&ctx, Duration::from_millis(50), 5, move |_| {
            let calls = counted.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::Provider("flaky".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let ctx = CancellationToken::new();
        let result: Result<(), _> = retry(&ctx, Duration::from_millis(50), 2, |_| async {
            Err(GatewayError::Provider("down".to_string()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Provider(_))));
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_expired() {
        let ctx = CancellationToken::new();
        let result: Result<(), _> = retry(&ctx, Duration::from_millis(10), 2, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GatewayError::ContextExpired)));
    }

    #[tokio::test]
    async fn test_cancelled_parent_aborts() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result: Result<(), _> = retry(&ctx, Duration::from_millis(50), 5, move |_| {
            let calls = counted.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::ContextExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
