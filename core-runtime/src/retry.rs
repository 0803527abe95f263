//! # Retry Executor
//!
//! Bounded retry with backoff around any fallible async operation.
//!
//! ## Overview
//!
//! [`RetryPolicy`] knows nothing about what it retries. Each failure is
//! classified into an [`ErrorClass`]:
//!
//! - **Transient**: wait for the backoff delay and try again, up to
//!   `max_attempts` total attempts
//! - **Permanent**: stop immediately; the caller records the item as failed
//! - **Fatal**: stop immediately; the caller aborts the run
//!
//! The operation closure receives the 1-based attempt number, so callers can
//! re-acquire a rate limiter or log per attempt.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::retry::{Backoff, RetryPolicy, RetryOutcome};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Backoff::exponential(Duration::from_millis(500), Duration::from_secs(30)));
//! let outcome = policy
//!     .run(|attempt| async move {
//!         limiter.acquire().await;
//!         remote.create(&upload).await
//!     })
//!     .await;
//!
//! match outcome {
//!     RetryOutcome::Succeeded { value, attempts } => { /* record */ }
//!     RetryOutcome::Failed { error, attempts, .. } => { /* mark failed */ }
//!     RetryOutcome::Fatal { error, .. } => { /* abort run */ }
//! }
//! ```

use crate::config::{BackoffKind, RetryConfig};
use bridge_traits::remote::{ErrorClass, RemoteError};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delay applied between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max }
    }

    /// Delay before retry number `retry` (the first retry is 1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exponent = retry.saturating_sub(1);
                1u32.checked_shl(exponent)
                    .and_then(|factor| base.checked_mul(factor))
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        match config.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(config.base_delay),
            BackoffKind::Exponential => Backoff::Exponential {
                base: config.base_delay,
                max: config.max_delay,
            },
        }
    }
}

/// Errors that carry their own retry classification.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// Minimum wait requested by the failing side.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Classify for RemoteError {
    fn class(&self) -> ErrorClass {
        self.class
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Succeeded {
        value: T,
        attempts: u32,
    },
    /// Permanent failure, or transient failures until the attempt ceiling
    /// (`exhausted == true`).
    Failed {
        error: E,
        attempts: u32,
        exhausted: bool,
    },
    Fatal {
        error: E,
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Failed { attempts, .. }
            | RetryOutcome::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Failed { error, .. } | RetryOutcome::Fatal { error, .. } => Err(error),
        }
    }
}

/// Bounded retry discipline: attempt ceiling plus backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; zero is treated as one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1, Backoff::None)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `op` using the error's own [`Classify`] implementation.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> RetryOutcome<T, E>
    where
        E: Classify + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(|error: &E| (error.class(), error.retry_after()), op)
            .await
    }

    /// Run `op`, classifying failures with `classify`.
    ///
    /// `classify` returns the error class and an optional minimum delay; a
    /// hint longer than the computed backoff replaces it.
    pub async fn run_with<T, E, C, F, Fut>(&self, classify: C, mut op: F) -> RetryOutcome<T, E>
    where
        E: std::fmt::Display,
        C: Fn(&E) -> (ErrorClass, Option<Duration>),
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) => error,
            };

            let (class, hint) = classify(&error);
            match class {
                ErrorClass::Fatal => {
                    return RetryOutcome::Fatal {
                        error,
                        attempts: attempt,
                    }
                }
                ErrorClass::Permanent => {
                    return RetryOutcome::Failed {
                        error,
                        attempts: attempt,
                        exhausted: false,
                    }
                }
                ErrorClass::Transient if attempt >= self.max_attempts => {
                    return RetryOutcome::Failed {
                        error,
                        attempts: attempt,
                        exhausted: true,
                    }
                }
                ErrorClass::Transient => {
                    let computed = self.backoff.delay_for(attempt);
                    let delay = hint.map_or(computed, |hint| hint.max(computed));

                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Backoff::from(config))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Backoff::exponential(Duration::from_millis(500), Duration::from_secs(30)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn scripted(
        results: Vec<Result<&'static str, RemoteError>>,
    ) -> impl FnMut(u32) -> std::future::Ready<Result<&'static str, RemoteError>> {
        let mut results = results.into_iter();
        move |_attempt| {
            std::future::ready(
                results
                    .next()
                    .unwrap_or_else(|| Err(RemoteError::permanent("script exhausted"))),
            )
        }
    }

    #[test]
    fn test_backoff_delays() {
        assert_eq!(Backoff::None.delay_for(3), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(40)).delay_for(5),
            Duration::from_millis(40)
        );

        let exp = Backoff::exponential(Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(exp.delay_for(1), Duration::from_millis(100));
        assert_eq!(exp.delay_for(2), Duration::from_millis(200));
        assert_eq!(exp.delay_for(4), Duration::from_millis(800));
        assert_eq!(exp.delay_for(5), Duration::from_millis(1000));
        assert_eq!(exp.delay_for(40), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success_counts_attempts() {
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(10)));
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::transient("timeout")),
                Err(RemoteError::transient("timeout")),
                Ok("remote-1"),
            ]))
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                value: "remote-1",
                attempts: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_stops_after_one_attempt() {
        let policy = RetryPolicy::new(5, Backoff::None);
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::permanent("unsupported format")),
                Ok("never"),
            ]))
            .await;

        match outcome {
            RetryOutcome::Failed {
                attempts,
                exhausted,
                error,
            } => {
                assert_eq!(attempts, 1);
                assert!(!exhausted);
                assert_eq!(error.class, ErrorClass::Permanent);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_reported_distinctly() {
        let policy = RetryPolicy::new(5, Backoff::None);
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::transient("503")),
                Err(RemoteError::fatal("token revoked")),
            ]))
            .await;

        assert!(matches!(outcome, RetryOutcome::Fatal { attempts: 2, .. }));
        assert!(outcome.into_result().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_yields_failed() {
        let policy = RetryPolicy::new(3, Backoff::None);
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::transient("a")),
                Err(RemoteError::transient("b")),
                Err(RemoteError::transient("c")),
                Ok("too late"),
            ]))
            .await;

        match outcome {
            RetryOutcome::Failed {
                attempts,
                exhausted,
                error,
            } => {
                assert_eq!(attempts, 3);
                assert!(exhausted);
                assert_eq!(error.message, "c");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_waits() {
        let policy = RetryPolicy::new(
            4,
            Backoff::exponential(Duration::from_millis(100), Duration::from_secs(1)),
        );
        let start = Instant::now();
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::transient("1")),
                Err(RemoteError::transient("2")),
                Err(RemoteError::transient("3")),
                Ok("done"),
            ]))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(800), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_overrides_shorter_backoff() {
        let policy = RetryPolicy::new(2, Backoff::Fixed(Duration::from_millis(10)));
        let start = Instant::now();
        let outcome = policy
            .run(scripted(vec![
                Err(RemoteError::rate_limited(Some(Duration::from_secs(2)))),
                Ok("ok"),
            ]))
            .await;

        assert!(outcome.is_success());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let policy = RetryPolicy::new(3, Backoff::None);
        let mut calls = 0;
        let outcome: RetryOutcome<(), String> = policy
            .run_with(
                |msg: &String| {
                    if msg == "busy" {
                        (ErrorClass::Transient, None)
                    } else {
                        (ErrorClass::Permanent, None)
                    }
                },
                |_| {
                    calls += 1;
                    let result = if calls < 3 {
                        Err("busy".to_string())
                    } else {
                        Ok(())
                    };
                    async move { result }
                },
            )
            .await;

        assert_eq!(outcome.attempts(), 3);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_attempts: 4,
            backoff: BackoffKind::Fixed,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(25),
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.backoff(), Backoff::Fixed(Duration::from_millis(25)));
        assert_eq!(RetryPolicy::new(0, Backoff::None).max_attempts(), 1);
    }
}
