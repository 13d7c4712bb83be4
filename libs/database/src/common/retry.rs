use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration shared by connection bootstrap and remote calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to prevent thundering herd
    pub use_jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration with defaults
    ///
    /// Defaults:
    /// - max_retries: 3
    /// - initial_delay_ms: 100
    /// - max_delay_ms: 5000
    /// - backoff_multiplier: 2.0
    /// - use_jitter: true
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Configure by total attempt count instead of retries. Zero is treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_retries = max_attempts.saturating_sub(1);
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Total number of attempts this config allows, including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// The last error of a retried operation and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempts)", self.error, self.attempts)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Delay before retry number `retry_index` (zero-based), without jitter.
///
/// `min(initial * multiplier^retry_index, max_delay)`, and never below `initial`
/// unless `initial` itself exceeds the cap.
pub fn backoff_delay_ms(config: &RetryConfig, retry_index: u32) -> u64 {
    let factor = config.backoff_multiplier.max(1.0).powi(retry_index.min(63) as i32);
    let raw = config.initial_delay_ms as f64 * factor;

    if !raw.is_finite() || raw >= config.max_delay_ms as f64 {
        config.max_delay_ms
    } else {
        raw as u64
    }
}

/// Retry an async operation while `should_retry` classifies its error as retryable.
///
/// The loop is bounded by [`RetryConfig::max_attempts`]. A non-retryable error is
/// returned immediately; otherwise the last error is returned once attempts run
/// out. In both cases the returned [`RetryExhausted`] carries the attempt count.
pub async fn retry_when<F, Fut, T, E, P>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: P,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) if !should_retry(&error) => {
                debug!(attempt, %error, "Operation failed with non-retryable error");
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) if attempt >= max_attempts => {
                warn!(attempts = attempt, %error, "Operation failed, retries exhausted");
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay_ms = retry_delay_ms(config, attempt - 1);

                debug!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    %error,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Delay actually slept before retry number `retry_index`.
///
/// With jitter the backoff is scaled to 50-100%, then raised back to
/// `initial_delay_ms` (capped by `max_delay_ms`) so no retry fires early.
pub fn retry_delay_ms(config: &RetryConfig, retry_index: u32) -> u64 {
    let base = backoff_delay_ms(config, retry_index);
    if !config.use_jitter {
        return base;
    }

    let floor = config.initial_delay_ms.min(config.max_delay_ms);
    apply_jitter(base).max(floor)
}

/// Pseudo-random value between 50% and 100% of `delay`
fn apply_jitter(delay: u64) -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let random_factor =
        (RandomState::new().hash_one(std::time::SystemTime::now()) % 50) as f64 / 100.0 + 0.5;

    (delay as f64 * random_factor) as u64
}
