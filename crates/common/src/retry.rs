//! Rate-limit aware retry loop shared by bulk listings and message delivery.

use std::{error::Error as StdError, fmt, future::Future, time::Duration};

use {tokio_util::sync::CancellationToken, tracing::warn};

/// How many rate-limit signals a call may absorb before giving up.
///
/// Only rate-limit signals are retried. Any other failure is returned at
/// once, and a cancelled token interrupts the wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: Option<usize>,
}

impl RetryPolicy {
    /// Retry until the call succeeds or the token is cancelled.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_retries: None }
    }

    #[must_use]
    pub const fn bounded(max_retries: usize) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }

    #[must_use]
    pub const fn from_limit(max_retries: Option<usize>) -> Self {
        Self { max_retries }
    }

    /// Run `request` until it succeeds, fails with a non rate-limit error,
    /// exhausts the retry budget, or `cancel` fires.
    ///
    /// `retry_after` classifies an error: `Some(wait)` marks a rate-limit
    /// signal and carries the duration to sleep before calling again.
    pub async fn run<T, E, F, Fut, W>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        retry_after: W,
        mut request: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        W: Fn(&E) -> Option<Duration>,
    {
        let mut retries = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let err = match request().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(wait) = retry_after(&err) else {
                return Err(RetryError::Failed(err));
            };

            if let Some(max_retries) = self.max_retries
                && retries >= max_retries
            {
                warn!(
                    operation,
                    retries,
                    max_retries,
                    retry_after_ms = millis(wait),
                    "rate limit persisted after retries"
                );
                return Err(RetryError::Exhausted {
                    retries,
                    source: err,
                });
            }

            retries += 1;
            warn!(
                operation,
                retries,
                retry_after_ms = millis(wait),
                "rate limited, waiting before retry"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(wait) => {},
            }
        }
    }
}

/// Whole milliseconds of `wait` for log fields, saturating at `u64::MAX`.
#[must_use]
pub fn millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}

/// Why a retried call did not produce a value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The owning task was cancelled before or while waiting.
    Cancelled,
    /// Every allowed retry was answered with another rate-limit signal.
    Exhausted { retries: usize, source: E },
    /// A failure that is not a rate-limit signal; never retried.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled while waiting to retry"),
            Self::Exhausted { retries, source } => {
                write!(f, "rate limit persisted after {retries} retries: {source}")
            },
            Self::Failed(source) => write!(f, "{source}"),
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Cancelled => None,
            Self::Exhausted { source, .. } => Some(source),
            Self::Failed(source) => source.source(),
        }
    }
}
