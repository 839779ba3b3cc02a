use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use agentflow_core::config::RetryConfig;
use agentflow_core::error::{AgentFlowError, Result};

pub(crate) fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let ms = config
        .initial_backoff_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. Backoff sleeps are interrupted by cancellation.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    model: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = config.max_retries;
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let backoff = calculate_backoff(attempt, config);
                warn!(
                    model = %model,
                    attempt = attempt + 1,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying provider request"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AgentFlowError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    fn transient() -> AgentFlowError {
        AgentFlowError::Provider {
            model: "m".into(),
            message: "HTTP 503: overloaded".into(),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(6000));
        assert!(d >= Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast(), "m", &CancellationToken::new(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "m", &CancellationToken::new(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "m", &CancellationToken::new(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AgentFlowError::Provider {
                model: "m".into(),
                message: "HTTP 401: unauthorized".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let slow = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
        };
        let result: Result<()> = with_retry(&slow, "m", &cancel, || async { Err(transient()) }).await;
        assert!(matches!(result, Err(AgentFlowError::Cancelled)));
    }
}
