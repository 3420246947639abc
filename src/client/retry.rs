// Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::errors::Result;

/// Run `f`, retrying transient failures up to `retries` extra times.
///
/// Delay doubles per attempt starting at `base_delay`. Non-transient
/// errors (bad credentials, parse failures) are returned immediately.
pub async fn with_retry<F, Fut, T>(retries: u32, base_delay: Duration, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < retries && e.is_transient() => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(
                    "Request failed (attempt {}/{}): {}, retrying in {:?}",
                    attempt + 1,
                    retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
