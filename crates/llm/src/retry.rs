//! Retry-with-backoff policy: exponential `2^retry_count` seconds, capped
//! at 30s, up to `MAX_RETRIES` attempts before giving up.

use std::time::Duration;

use minerva_domain::{PipelineError, Result};
use tracing::warn;

pub const MAX_RETRIES: u32 = 3;

fn backoff(retry_count: u32) -> Duration {
    let secs = 2u64.saturating_pow(retry_count).min(30);
    Duration::from_secs(secs)
}

/// Run `attempt` up to `MAX_RETRIES` additional times on a retryable
/// error, sleeping with capped exponential backoff between attempts.
pub async fn with_retry<F, Fut, T>(operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut retry_count = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retry_count < MAX_RETRIES => {
                let wait = backoff(retry_count);
                warn!(operation, retry_count, wait_secs = wait.as_secs(), error = %err, "retrying after error");
                tokio::time::sleep(wait).await;
                retry_count += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// A final, non-retryable failure with the retry count it exhausted,
/// wrapped so callers can distinguish "never retryable" from "retried out".
pub fn exhausted(operation: &str, retries: u32) -> PipelineError {
    PipelineError::budget(format!("{operation} exhausted {retries} retries"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps_at_thirty_seconds() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(10), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_the_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test-op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < MAX_RETRIES {
                    Err(PipelineError::transport("still failing"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn never_retries_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test-op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::consistency("bad state")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
