// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry combinator.
//!
//! Used on the local save path, per tier, before degrading to the next one.
//! A tier timeout ends the loop at once: the caller falls back instead of
//! waiting out another budget on a stalled tier. Remote writes are never
//! retried within a pass.
//!
//! # Example
//!
//! ```
//! use field_sync::RetryConfig;
//! use std::time::Duration;
//!
//! // Fixed backoff: three attempts, 100ms apart
//! let write = RetryConfig::fixed(3, Duration::from_millis(100));
//! assert_eq!(write.max_attempts, 3);
//! assert_eq!(write.delay, Duration::from_millis(100));
//!
//! // Single attempt, no waiting
//! assert_eq!(RetryConfig::once().max_attempts, 1);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy: attempt count plus the fixed delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first (at least 1)
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::local_write()
    }
}

impl RetryConfig {
    /// Fixed backoff: `max_attempts` tries, `delay` apart.
    #[must_use]
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt.
    #[must_use]
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Local tier writes: 3 attempts, 100ms apart.
    #[must_use]
    pub fn local_write() -> Self {
        Self::fixed(3, Duration::from_millis(100))
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self::fixed(3, Duration::from_millis(1))
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Returns the last error when every attempt fails.
pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(operation_name, config, |_| true, operation).await
}

/// Like [`retry`], but an error for which `should_retry` returns `false`
/// is returned immediately.
pub async fn retry_if<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) if attempt >= max_attempts => {
                return Err(err);
            }
            Err(err) if !should_retry(&err) => {
                debug!(operation = operation_name, attempt, error = %err, "Error is not retryable");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Operation failed, retrying in {:?}",
                    config.delay
                );
                sleep(config.delay).await;
            }
        }
    }
}
