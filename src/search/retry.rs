//! Retry with exponential backoff for browser-backed searches

use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Substrings of errors that a retry on the same session cannot fix.
const PERMANENT_MARKERS: &[&str] = &[
    "browser closed",
    "browser disconnected",
    "page closed",
    "target closed",
    "session not found",
    "session closed",
    "no response from the chromium instance",
    "channel",
    "captcha",
    "websocket",
];

/// Whether another attempt could plausibly succeed.
///
/// Dead sessions and CAPTCHA walls are permanent; everything else
/// (timeouts, network trouble, rate limiting, unknown) is retried.
pub(crate) fn is_retryable_error(error: &anyhow::Error) -> bool {
    let message = format!("{error:#}").to_lowercase();
    let missing_frame = message.contains("frame") && message.contains("not found");
    !missing_frame && !PERMANENT_MARKERS.iter().any(|m| message.contains(m))
}

/// Backoff before retry number `retries` (0-based): 2^n seconds plus up to 1s jitter.
fn backoff_delay(retries: u32, base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    base * 2u32.pow(retries) + Duration::from_millis(rand::rng().random_range(0..1000))
}

/// Run `op` until it succeeds, fails permanently, or `max_retries` retries
/// have been spent.
pub async fn retry_with_backoff<F, Fut, T>(op: F, max_retries: u32) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_with_base(op, max_retries, Duration::from_secs(1)).await
}

pub(crate) async fn retry_with_base<F, Fut, T>(op: F, max_retries: u32, base: Duration) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable_error(&error) {
            warn!("Permanent search failure: {error:#}");
            return Err(error);
        }
        if attempt >= max_retries {
            warn!(max_retries, "Search retries exhausted: {error:#}");
            return Err(error);
        }

        let delay = backoff_delay(attempt, base);
        attempt += 1;
        warn!(
            attempt,
            max_retries,
            delay_ms = delay.as_millis() as u64,
            "Transient search failure, retrying: {error:#}"
        );
        tokio::time::sleep(delay).await;
    }
}
