//! Deadline and cancellation enforcement.
//!
//! # Responsibilities
//! - Wrap each attempt with a deadline
//! - Abort in-flight work when the caller cancels
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from network errors
//! - Dropping the losing future is what aborts the network call

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Fail with `ApiError::Timeout` if `fut` does not finish within `deadline`.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(format!("no response within {deadline:?}"))),
    }
}

/// Race `fut` against the cancellation token, if one is set.
pub async fn cancellable<T, Fut>(token: Option<&CancellationToken>, fut: Fut) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    let Some(token) = token else {
        return fut.await;
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ApiError::Cancelled),
        result = fut => result,
    }
}

/// Sleep for `delay` unless cancelled first.
pub async fn sleep_unless_cancelled(
    token: Option<&CancellationToken>,
    delay: Duration,
) -> Result<(), ApiError> {
    cancellable(token, async {
        tokio::time::sleep(delay).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result: Result<(), _> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_sleep_returns_early() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let result = sleep_unless_cancelled(Some(&token), Duration::from_secs(60)).await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }

    #[tokio::test]
    async fn test_no_token_runs_to_completion() {
        let result = cancellable(None, async { Ok("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
