//! Retry Handler (§4.3): wraps an arbitrary async attempt function with
//! classification-driven backoff.

use std::future::Future;
use std::time::Duration;

use crate::config::{BackoffKind, RetryConfig};
use crate::error::Classification;

/// Computed backoff delay for attempt index `attempt` (0-based), per the
/// formulas in §4.3, clamped to `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay_ms;
    let max = config.max_delay_ms;
    let raw_ms: u64 = match config.backoff {
        BackoffKind::Fixed => initial,
        BackoffKind::Linear => initial.saturating_mul(u64::from(attempt) + 1),
        BackoffKind::Exponential => {
            let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
            initial.saturating_mul(factor)
        }
    };
    Duration::from_millis(raw_ms.min(max))
}

/// Outcome of a single attempt, used so the caller's closure can report a
/// typed error without this generic module depending on every error enum.
pub enum Attempt<T, E> {
    Ok(T),
    Err(E),
}

/// Executes `fn_` up to `retry.max_attempts` times (or once, if `retry` is
/// `None`), sleeping between attempts per [`backoff_delay`] and stopping
/// early on a non-retryable classification. `on_retry` is called before
/// each sleep with the zero-based attempt number that just failed and the
/// delay about to be slept, so the caller can update a `StageExecution`'s
/// `retryAttempt` field.
///
/// On exhaustion, the *last* error is returned (§4.3 "Tie-break").
pub async fn execute_with_retry<T, E, F, Fut, OnRetry>(
    retry: Option<&RetryConfig>,
    classify: impl Fn(&E) -> Classification,
    mut fn_: F,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    OnRetry: FnMut(u32, Duration),
{
    let default_retry;
    let retry = match retry {
        Some(r) => r,
        None => {
            // No retryConfig => a single attempt (§4.3).
            default_retry = RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            };
            &default_retry
        }
    };

    let mut attempt = 0u32;
    loop {
        match fn_(attempt).await {
            Attempt::Ok(value) => return Ok(value),
            Attempt::Err(err) => {
                let is_last = attempt + 1 >= retry.max_attempts;
                if is_last || classify(&err) == Classification::NonRetryable {
                    return Err(err);
                }
                let delay = backoff_delay(retry, attempt);
                on_retry(attempt, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cfg(max_attempts: u32, backoff: BackoffKind, initial_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff,
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
        }
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let c = cfg(5, BackoffKind::Fixed, 100, 10_000);
        for attempt in 0..4 {
            assert_eq!(backoff_delay(&c, attempt), Duration::from_millis(100));
        }
    }

    #[test]
    fn linear_backoff_scales_by_attempt_plus_one() {
        let c = cfg(5, BackoffKind::Linear, 100, 10_000);
        assert_eq!(backoff_delay(&c, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&c, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&c, 2), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_doubles_and_clamps() {
        let c = cfg(10, BackoffKind::Exponential, 100, 500);
        assert_eq!(backoff_delay(&c, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&c, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&c, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(&c, 3), Duration::from_millis(500)); // clamped
        assert_eq!(backoff_delay(&c, 10), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_transient_error_then_succeeds() {
        let calls = AtomicU32::new(0);
        let retry = cfg(3, BackoffKind::Linear, 1, 5);
        let result: Result<&str, &str> = execute_with_retry(
            Some(&retry),
            |e: &&str| Classification::classify_message(e),
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Attempt::Err("ETIMEDOUT")
                    } else {
                        Attempt::Ok("done")
                    }
                }
            },
            |_, _| {},
        )
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_escapes_on_first_occurrence() {
        let calls = AtomicU32::new(0);
        let retry = cfg(5, BackoffKind::Fixed, 1, 5);
        let result: Result<&str, &str> = execute_with_retry(
            Some(&retry),
            |e: &&str| Classification::classify_message(e),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Err("401 unauthorized") }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_error() {
        let counter = AtomicU32::new(0);
        let retry = cfg(3, BackoffKind::Fixed, 1, 5);
        let result: Result<&str, String> = execute_with_retry(
            Some(&retry),
            |_: &String| Classification::Retryable,
            |_attempt| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Attempt::Err(format!("ETIMEDOUT attempt {n}")) }
            },
            |_, _| {},
        )
        .await;
        assert_eq!(result.unwrap_err(), "ETIMEDOUT attempt 2");
    }

    #[tokio::test]
    async fn absent_retry_config_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = execute_with_retry(
            None,
            |e: &&str| Classification::classify_message(e),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Err("ETIMEDOUT") }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
