//! Failure classification and retry bounds for embedding calls.
//!
//! The predicates here are pure so they can be tested without a network.

use core_config::{ConfigError, FromEnv, env_parse};
use database::common::RetryConfig;
use reqwest::StatusCode;

use crate::error::VectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt after backoff
    Transient,
    /// Surfaced immediately
    Permanent,
}

/// 5xx is transient. Every 4xx (429 included) is a client error and permanent.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status.is_server_error() {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

/// Timeouts, refused or reset connections and interrupted bodies are transient.
pub fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

/// Retry predicate over a single attempt's error
pub fn is_retryable(err: &VectorError) -> bool {
    matches!(err, VectorError::TransientProvider { .. })
}

/// Backoff bounds for embedding requests
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for EmbeddingRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay_ms: 200,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

impl EmbeddingRetryPolicy {
    pub fn new(max_attempts: u32, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            min_delay_ms,
            max_delay_ms,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        let config = RetryConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(self.min_delay_ms)
            .with_max_delay(self.max_delay_ms.max(self.min_delay_ms));

        if self.jitter {
            config
        } else {
            config.without_jitter()
        }
    }
}

/// - `EMBEDDING_MAX_ATTEMPTS` (default: 5)
/// - `EMBEDDING_MIN_DELAY_MS` (default: 200)
/// - `EMBEDDING_MAX_DELAY_MS` (default: 10000)
impl FromEnv for EmbeddingRetryPolicy {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: env_parse("EMBEDDING_MAX_ATTEMPTS", "5")?,
            min_delay_ms: env_parse("EMBEDDING_MIN_DELAY_MS", "200")?,
            max_delay_ms: env_parse("EMBEDDING_MAX_DELAY_MS", "10000")?,
            jitter: true,
        })
    }
}
