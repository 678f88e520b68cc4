// ── Retry / backoff executor ──
//
// Wraps a fallible remote call in bounded exponential backoff with
// jitter. Authentication failures are attempted once and propagate.
// Everything else is attempted `max_retries + 1` times.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Attempt ceiling and delay curve for one class of remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the uniform random jitter.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Initial status fetches during discovery.
    pub const fn discovery() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(500),
        }
    }

    /// Steady-state polls.
    pub const fn poll() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(500),
        }
    }

    /// User-initiated commands get the most attempts.
    pub const fn command() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            jitter: Duration::from_millis(500),
        }
    }

    /// Push channel connects.
    pub const fn push() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }

    /// A policy with no jitter, for deterministic timing.
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = Duration::ZERO;
        self
    }

    /// `min(base * 2^attempt + jitter, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .checked_mul(2u32.saturating_pow(attempt.min(20)))
            .unwrap_or(self.max_delay);
        (exp + self.random_jitter()).min(self.max_delay)
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let upper = u64::try_from(self.jitter.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::thread_rng().gen_range(0..upper))
    }
}

impl CoreError {
    /// Whether another attempt could succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed { .. }
                | Self::Rejected { .. }
                | Self::ValidationFailed { .. }
                | Self::UnitNotFound { .. }
                | Self::Cancelled
                | Self::Terminated
                | Self::Config { .. }
        )
    }
}

/// Run `op` under `policy`, sleeping between attempts.
///
/// Cancelling `cancel` abandons the current attempt or wait and returns
/// [`CoreError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(op = label, error = %err, "not retrying");
            return Err(err);
        }

        if attempt >= policy.max_retries {
            warn!(op = label, attempts = attempt + 1, error = %err, "retries exhausted");
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        debug!(
            op = label,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "retrying after backoff"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> CoreError {
        CoreError::Transient {
            message: "busy".into(),
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(64), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        };
        for _ in 0..100 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_secs(1));
            assert!(d < Duration::from_millis(1250));
        }
    }

    #[test]
    fn commands_get_the_highest_ceiling() {
        let command = RetryPolicy::command().max_retries;
        assert!(command > RetryPolicy::poll().max_retries);
        assert!(command > RetryPolicy::discovery().max_retries);
        assert!(command > RetryPolicy::push().max_retries);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_attempted_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::poll();
        let cancel = CancellationToken::new();

        let c = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&policy, &cancel, "test", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), policy.max_retries + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_errors_attempted_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let c = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&RetryPolicy::command(), &cancel, "test", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::AuthenticationFailed {
                    message: "401".into(),
                })
            }
        })
        .await;

        assert!(result.unwrap_err().is_auth_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let c = Arc::clone(&calls);
        let value = with_retry(&RetryPolicy::discovery(), &cancel, "test", || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            jitter: Duration::ZERO,
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result: Result<(), _> =
            with_retry(&policy, &cancel, "test", || async { Err(transient()) }).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
