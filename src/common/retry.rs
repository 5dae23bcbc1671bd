//! Reconnect-with-backoff policy for external dependencies
//!
//! The same policy type drives startup connections (long delays, fatal on
//! exhaustion) and steady-state calls (short delays, error surfaced to the
//! caller). Only errors reporting [`Error::is_retryable`] are retried.

use crate::common::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Growth factor applied after each failed attempt (1.0 = fixed delay)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Ceiling for any single delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Add up to 10% random jitter to each delay
    #[serde(default)]
    pub jitter: bool,
}

fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay() -> u64 {
    60_000
}

impl RetryPolicy {
    /// Startup connections: 5 attempts, 5 s initial delay
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5_000,
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: true,
        }
    }

    /// Steady-state calls: fail fast back to the caller
    pub fn steady_state() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 50,
            multiplier: default_multiplier(),
            max_delay_ms: 1_000,
            jitter: true,
        }
    }

    /// A single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(format!(
                "{}.max_attempts must be at least 1",
                field
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "{}.multiplier must be >= 1.0",
                field
            )));
        }
        Ok(())
    }

    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let mut millis = base.min(self.max_delay_ms as f64);
        if self.jitter && millis > 0.0 {
            millis += rand::thread_rng().gen_range(0.0..=millis * 0.1);
        }
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::steady_state()
    }
}

/// Retry `f` under `policy`.
///
/// Non-retryable errors are returned as-is. Exhausting the budget on a
/// retryable error yields [`Error::DependencyUnavailable`] naming `dependency`.
pub async fn retry_with_backoff<F, Fut, T>(
    dependency: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}, retrying in {:?}",
                        dependency,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::dependency(
        dependency,
        match last_error {
            Some(e) => format!("gave up after {} attempts: {}", attempts, e),
            None => format!("gave up after {} attempts", attempts),
        },
    ))
}

/// Establish a startup connection; exhaustion is fatal for the caller.
pub async fn connect_with_retry<F, Fut>(dependency: &str, policy: &RetryPolicy, f: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match retry_with_backoff(dependency, policy, f).await {
        Ok(()) => {
            tracing::info!("Connected to {}", dependency);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Could not connect to {}: {}", dependency, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 5,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 350,
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(6), Duration::from_millis(350));
    }

    #[test]
    fn test_fixed_delay() {
        let mut policy = RetryPolicy::startup();
        policy.multiplier = 1.0;
        policy.jitter = false;
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = retry_with_backoff("index", &fast(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::dependency("index", "refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_dependency() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = connect_with_retry("bus", &fast(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Timeout("bus".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::DependencyUnavailable { dependency, .. }) => assert_eq!(dependency, "bus"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("index", &fast(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound("x".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::startup().validate("retry").is_ok());
        let mut policy = RetryPolicy::none();
        policy.max_attempts = 0;
        assert!(policy.validate("retry").is_err());
    }
}
