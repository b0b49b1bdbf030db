//! Fixed-delay retry wrapper for fallible upstream operations.
//!
//! The executor retries transient failures with a constant wait between
//! attempts. The wait is deliberately not exponential: both upstream services
//! rate-limit on short windows, and a fixed pause matches their recovery
//! behavior well enough in practice. Whether production use wants backoff
//! growth is an open question tracked in DESIGN.md.
//!
//! # Example
//!
//! ```ignore
//! use magpie_core::retry::RetryExecutor;
//! use tokio_util::sync::CancellationToken;
//!
//! let retry = RetryExecutor::default();
//! let cancel = CancellationToken::new();
//!
//! // Best effort: a page that still fails after retries yields None.
//! let page = retry
//!     .run_best_effort(&cancel, || client.search("rust", None, None, 500))
//!     .await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Retries an async operation with a fixed delay between attempts.
///
/// Non-retryable errors (see [`AppError::is_retryable`]) propagate
/// immediately; retrying a bad credential or a malformed payload only
/// burns the retry budget.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Fixed wait between attempts.
    pub wait: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            max_retries: 5,
            wait: Duration::from_secs(5),
        }
    }
}

impl RetryExecutor {
    /// Creates an executor with the given retry budget and wait.
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self { max_retries, wait }
    }

    /// Executes the operation, retrying transient failures.
    ///
    /// The cancellation token is checked before each attempt and honored
    /// mid-wait; on cancellation the last observed error (or a generic
    /// cancellation error if none) is returned.
    ///
    /// # Errors
    ///
    /// The last error once the retry budget is exhausted, or the first
    /// non-retryable error.
    pub async fn run<F, T, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut last_error = AppError::Generic("operation cancelled before first attempt".into());

        for attempt in 0..=self.max_retries {
            if cancel.is_cancelled() {
                return Err(last_error);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt < self.max_retries {
                tokio::select! {
                    _ = tokio::time::sleep(self.wait) => {}
                    _ = cancel.cancelled() => return Err(last_error),
                }
            }
        }

        Err(last_error)
    }

    /// Executes the operation best-effort: exhausted retries yield `None`.
    ///
    /// Used for skippable work (a search page, a resolve chunk) where
    /// partial loss is logged and tolerated rather than fatal to the run.
    pub async fn run_best_effort<F, T, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match self.run(cancel, operation).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Giving up after retries, skipping");
                None
            }
        }
    }
}
