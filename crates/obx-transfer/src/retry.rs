//! One retry-with-backoff policy shared by every transfer call.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use obx_core::config::TransferConfig;

/// Bounded exponential backoff: after failed attempt `n` (0-based) and while
/// `n < max_retries`, wait `base_delay * 2^n`. No delay before the first
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(cfg: &TransferConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.base_delay(),
        }
    }
}

/// The last error once the policy gives up, with the number of attempts made.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay slept after failed attempt `n`.
    pub fn delay_for(&self, n: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(n))
    }

    /// Upper bound on time spent sleeping across one call.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries).map(|n| self.delay_for(n)).sum()
    }

    fn backoff(&self) -> ExponentialBuilder {
        let ceiling = self.delay_for(self.max_retries.saturating_sub(1));
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(ceiling.max(self.base_delay))
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the retry budget is spent.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        op: F,
        retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = AtomicU32::new(0);
        let mut op = op;

        let result = (|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            op()
        })
        .retry(self.backoff())
        .sleep(tokio::time::sleep)
        .when(|e: &E| retryable(e))
        .notify(|e: &E, delay: Duration| {
            warn!(
                op = label,
                attempt = attempts.load(Ordering::Relaxed),
                delay_ms = delay.as_millis() as u64,
                "transfer attempt failed, retrying: {e}"
            );
        })
        .await;

        result.map_err(|error| RetryError {
            error,
            attempts: attempts.load(Ordering::Relaxed),
        })
    }
}
