use serde::{Deserialize, Serialize};
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::utils::strip_html;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential: 2.0,
        }
    }
}

/// Run `operation` until it succeeds or `max_attempts` is reached, returning the last error.
pub async fn retry<F, Fut, T, E>(operation: F, config: &RetryConfig, context: &str) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    let mut delay = config.base_delay_ms;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        context,
                        attempt,
                        strip_html(&e.to_string())
                    );
                    return Err(e);
                }

                warn!(
                    "Attempt {}/{} for '{}' failed: {}. Retrying in {}ms...",
                    attempt,
                    config.max_attempts,
                    context,
                    strip_html(&e.to_string()),
                    delay
                );

                sleep(Duration::from_millis(delay)).await;
                delay = next_delay(config, delay);
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff with full jitter, capped at `max_delay_ms`.
// https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
pub fn next_delay(config: &RetryConfig, delay: u64) -> u64 {
    let next_delay = delay.max(1) as f64 * config.exponential;
    std::cmp::min(config.max_delay_ms, (fastrand::f64() * next_delay) as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 1,
            max_delay_ms: 2,
            exponential: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);

        let result = retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("node unavailable")
                } else {
                    Ok(7u64)
                }
            },
            &fast(),
            "flaky",
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry(
            || async { Err(format!("attempt {}", calls.fetch_add(1, Ordering::SeqCst) + 1)) },
            &fast(),
            "broken",
        )
        .await;

        assert_eq!(result, Err("attempt 4".to_string()));
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = fast();
        for delay in [0, 1, 2, 1_000] {
            let next = next_delay(&config, delay);
            assert!((1..=config.max_delay_ms).contains(&next));
        }
    }
}
