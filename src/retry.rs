// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded retries with exponential backoff and jitter for remote calls.

use crate::constants::retry::{
    BASE_DELAY_MS, JITTER_FRACTION, MAX_ATTEMPTS, MAX_DELAY_MS, MULTIPLIER,
};
use crate::error::{CorralError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one, at least 1
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            multiplier: MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt` (1-based), before jitter is applied.
    /// The first attempt runs immediately.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is used up.
///
/// Exhaustion returns [`CorralError::RetriesExhausted`] holding the error of
/// every attempt. Cancellation is observed before each attempt and during each
/// backoff wait.
pub async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut errors = Vec::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.jittered(policy.delay_for(attempt));
            debug!(
                operation = %operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Waiting before next attempt"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(CorralError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(CorralError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < max_attempts {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Operation failed, retrying"
                    );
                }
                errors.push(e);
            }
        }
    }

    Err(CorralError::RetriesExhausted {
        operation: operation_name.to_string(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn unavailable() -> CorralError {
        CorralError::Http {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_delay_for_grows_and_caps() {
        let policy = make_policy(10);

        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(800));
        assert_eq!(policy.delay_for(6), Duration::from_secs(1));
        assert_eq!(policy.delay_for(9), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy {
            jitter: true,
            ..make_policy(3)
        };

        for _ in 0..100 {
            let d = policy.jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100));
        }
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let cancel = CancellationToken::new();
        let result = retry(&make_policy(3), &cancel, "op", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result = retry(&make_policy(5), &cancel, "op", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_every_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<()> = retry(&make_policy(3), &cancel, "fetch", || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 1 {
                    Err(CorralError::Network("reset".to_string()))
                } else {
                    Err(unavailable())
                }
            }
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
        match result {
            Err(CorralError::RetriesExhausted { operation, errors }) => {
                assert_eq!(operation, "fetch");
                assert_eq!(errors.len(), 3);
                assert!(matches!(errors[1], CorralError::Network(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<()> = retry(&make_policy(5), &cancel, "login", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CorralError::Http {
                    status: 401,
                    message: "unauthorized".to_string(),
                })
            }
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(CorralError::Http { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff_returns_promptly() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            ..make_policy(3)
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<()> =
            retry(&policy, &cancel, "op", || async { Err(unavailable()) }).await;

        assert!(matches!(result, Err(CorralError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_operation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<()> = retry(&make_policy(3), &cancel, "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(CorralError::Cancelled)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
