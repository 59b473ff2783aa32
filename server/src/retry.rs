use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Distinguishes failures worth another attempt from final ones.
pub enum RetryError<E> {
    /// Network issues and server errors
    Retryable(E),
    /// Client errors and malformed bodies
    NonRetryable(E),
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Extra attempts after the first one. 0 disables retrying.
    max_retries: u32,
    /// Base delay for exponential backoff.
    base_delay_ms: u64,
    /// Maximum jitter to add to backoff delay (as fraction of delay, e.g., 0.25 = ±25%).
    jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 0,
            base_delay_ms: 500,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        RetryConfig {
            max_retries,
            ..Default::default()
        }
    }
}

pub async fn with_retry<F, Fut, T, E>(func: F, config: &RetryConfig) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match func().await {
            Ok(result) => return Ok(result),
            Err(RetryError::Retryable(err)) if attempt < config.max_retries => {
                let delay = backoff_with_jitter(attempt, config);
                log::warn!(
                    "Retryable error: {}. Retry attempt {}/{} after {:?}",
                    err,
                    attempt + 1,
                    config.max_retries,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(RetryError::Retryable(err)) | Err(RetryError::NonRetryable(err)) => {
                return Err(err)
            }
        }
    }
}

/// Calculate backoff delay with jitter for a given attempt.
///
/// Uses exponential backoff: base_delay * 2^attempt
/// Adds random jitter of ±jitter_factor to prevent thundering herd.
fn backoff_with_jitter(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = (base_delay as f64 * config.jitter_factor) as u64;
    let jitter = rand::rng().random_range(0..=jitter_range * 2) as i64 - jitter_range as i64;
    let delay_ms = (base_delay as i64 + jitter).max(0) as u64;
    Duration::from_millis(delay_ms)
}
