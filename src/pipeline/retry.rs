use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Bounded retry with exponential backoff.
///
/// By default only errors for which [`Error::is_transient`] holds are retried.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: Option<Duration>,
    retry_if: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: None,
            retry_if: Arc::new(Error::is_transient),
        }
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Growth factor between consecutive delays. Values below 1.0 are clamped to 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.jitter = Some(max_jitter);
        self
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, error: &Error) -> bool {
        (self.retry_if)(error)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exp);
        let mut delay = Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if let Some(max_jitter) = self.jitter {
            let jitter = deterministic_jitter(max_jitter, attempt);
            delay = delay.saturating_add(jitter).min(self.max_delay);
        }

        delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    ///
    /// Cancellation is checked before every attempt and during backoff.
    pub async fn run<T, F, Fut>(
        &self,
        stage: &'static str,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 1u32;

        loop {
            if cancel.is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::DEBUG, event = "pdfharvest.cancelled", stage = stage, where_ = "attempt", "pdfharvest.cancelled");
                return Ok(RetryOutcome::Cancelled);
            }

            let error = match op(attempt).await {
                Ok(value) => {
                    return Ok(RetryOutcome::Done(Retried {
                        value,
                        attempts: attempt,
                    }))
                }
                Err(error) => error,
            };

            let retryable = self.is_retryable(&error);

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "pdfharvest.retry.attempt_failed",
                stage = stage,
                attempt = attempt,
                max_attempts = max_attempts,
                retryable = retryable,
                error = %error,
                "pdfharvest.retry.attempt_failed"
            );

            if !retryable {
                return Err(error);
            }

            if attempt >= max_attempts {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::ERROR,
                    event = "pdfharvest.retry.exhausted",
                    stage = stage,
                    attempts = max_attempts,
                    error = %error,
                    "pdfharvest.retry.exhausted"
                );
                return Err(Error::retry_exhausted(stage, max_attempts, error));
            }

            let delay = self.backoff_delay(attempt);
            if !delay.is_zero() {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "pdfharvest.retry.sleep",
                    stage = stage,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "pdfharvest.retry.sleep"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        #[cfg(feature = "tracing")]
                        tracing::event!(tracing::Level::DEBUG, event = "pdfharvest.cancelled", stage = stage, where_ = "backoff", "pdfharvest.cancelled");
                        return Ok(RetryOutcome::Cancelled);
                    },
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

fn deterministic_jitter(max_jitter: Duration, attempt: u32) -> Duration {
    let nanos = max_jitter.as_nanos().min(u128::from(u64::MAX)) as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }

    let seed = (attempt as u64)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    Duration::from_nanos(seed % nanos.saturating_add(1))
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Done(Retried<T>),
    Cancelled,
}
