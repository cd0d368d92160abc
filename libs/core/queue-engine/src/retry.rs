//! Network-retry wrapper (C2).
//!
//! Composes [`database::common::retry::retry_with_backoff`]: the first
//! attempt is made directly so a permanent [`QueueError`] (one where
//! [`QueueError::is_retryable`] is `false`) returns immediately instead of
//! being handed to the backoff loop at all. Once the first attempt comes
//! back transient, the remaining attempts are delegated to
//! `retry_with_backoff` unchanged, which is generic over the error type
//! and otherwise has no notion of "permanent" — it would retry any `Err`
//! blindly.
//!
//! This is distinct from *business* retry (the `retry_count` column,
//! touched only by [`crate::finalize`] and [`crate::recovery`]): this
//! module never reads or writes that column.

use crate::error::QueueError;
use database::common::retry::{retry_with_backoff, RetryConfig};
use std::future::Future;

#[derive(Debug, Clone)]
pub struct RetrierConfig {
    pub max_attempts: u32,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for RetrierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait_ms: 1_000,
            max_wait_ms: 10_000,
        }
    }
}

impl From<&RetrierConfig> for RetryConfig {
    fn from(cfg: &RetrierConfig) -> Self {
        RetryConfig::new()
            .with_max_retries(cfg.max_attempts.saturating_sub(1))
            .with_initial_delay(cfg.min_wait_ms)
            .with_max_delay(cfg.max_wait_ms)
    }
}

/// Runs `operation`, retrying with exponential backoff while the error it
/// returns is classified as transient. A permanent error is returned
/// immediately on its first occurrence, without ever entering
/// `retry_with_backoff`'s loop.
pub async fn retry_transient<F, Fut, T>(mut operation: F, cfg: &RetrierConfig) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let retry_config: RetryConfig = cfg.into();

    match operation().await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retryable() => return Err(err),
        Err(_) => {}
    }

    // One attempt has already been spent above; `retry_with_backoff` runs
    // its own first attempt plus up to `max_retries` more, so hand it one
    // fewer to keep the total at `max_attempts`.
    let mut delegated = retry_config;
    delegated.max_retries = delegated.max_retries.saturating_sub(1);
    retry_with_backoff(operation, delegated).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> QueueError {
        QueueError::Transient {
            operation: "test",
            source: database::DatabaseError::ConnectionFailed("boom".into()),
        }
    }

    fn permanent() -> QueueError {
        QueueError::argument("test", "bad input")
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cfg = RetrierConfig { max_attempts: 5, min_wait_ms: 1, max_wait_ms: 2 };

        let result: Result<&str, QueueError> = retry_transient(
            || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok("ok")
                    }
                }
            },
            &cfg,
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cfg = RetrierConfig::default();

        let result: Result<(), QueueError> = retry_transient(
            || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(permanent())
                }
            },
            &cfg,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cfg = RetrierConfig { max_attempts: 3, min_wait_ms: 1, max_wait_ms: 1 };

        let result: Result<(), QueueError> = retry_transient(
            || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            },
            &cfg,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
