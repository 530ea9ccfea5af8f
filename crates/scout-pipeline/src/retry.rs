//! Phase-level retry.
//!
//! A phase that fails with a retryable category (only `TIMEOUT`) is re-run
//! from scratch, up to `max_retries` additional times. Every other failure is
//! returned immediately.

use crate::error::ErrorContext;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// has been retried `max_retries` times.
///
/// The closure receives the 1-based attempt number. The returned error carries
/// the number of attempts made in [`ErrorContext::attempts`].
///
/// # Examples
///
/// ```rust,ignore
/// let result = retry_on_timeout(3, Duration::ZERO, |attempt| async move {
///     run_phase(attempt).await
/// })
/// .await;
/// ```
pub async fn retry_on_timeout<F, Fut, T>(
    max_retries: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T, ErrorContext>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ErrorContext>>,
{
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        match operation(attempts).await {
            Ok(output) => {
                if attempts > 1 {
                    info!(
                        attempt = attempts,
                        max_attempts = max_retries.saturating_add(1),
                        "Phase succeeded after retry"
                    );
                }
                return Ok(output);
            }
            Err(e) if e.is_retryable() && attempts <= max_retries => {
                warn!(
                    attempt = attempts,
                    max_attempts = max_retries.saturating_add(1),
                    phase = %e.phase,
                    error = %e,
                    "Phase timed out, retrying in {:?}",
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(
                        attempts,
                        phase = %e.phase,
                        "Phase failed after {} attempts (max retries exhausted): {}",
                        attempts,
                        e
                    );
                } else {
                    error!(phase = %e.phase, "Phase failed with non-retryable error: {}", e);
                }
                return Err(e.with_attempts(attempts));
            }
        }
    }
}
