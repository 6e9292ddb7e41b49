//! Bounded retries with exponential backoff and endpoint rotation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::endpoint::{Endpoint, EndpointPool};
use crate::error::{Classify, ErrorClass};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Why [`RetryConfig::run`] gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The operation failed with a non-retryable error.
    Permanent { error: E, attempts: u32 },
    /// Every allowed attempt failed transiently.
    Exhausted {
        error: E,
        attempts: u32,
        /// Endpoint targeted by each attempt, in order.
        endpoints: Vec<Endpoint>,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay before the retry that follows `attempt`.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `operation` against the pool's current endpoint until it succeeds,
    /// fails permanently, or runs out of attempts.
    ///
    /// The pool is rotated once, before the second attempt; later retries
    /// stay on that endpoint and only back off.
    pub async fn run<T, E, F, Fut>(
        &self,
        pool: &EndpointPool,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tried = Vec::with_capacity(max_attempts as usize);
        let mut attempt = 1;

        loop {
            let endpoint = pool.current();
            tracing::debug!(attempt, max_attempts, endpoint = %endpoint, "attempting remote call");
            tried.push(endpoint.clone());

            let error = match operation(endpoint).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let class = error.class();
            if !class.is_transient() {
                tracing::debug!(attempt, %error, "permanent failure, not retrying");
                return Err(RetryError::Permanent {
                    error,
                    attempts: attempt,
                });
            }

            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, %error, "retries exhausted");
                return Err(RetryError::Exhausted {
                    error,
                    attempts: attempt,
                    endpoints: tried,
                });
            }

            if attempt == 1 {
                let next = pool.advance();
                tracing::info!(endpoint = %next, "switching endpoint");
            }

            let delay_ms = self.delay_for_attempt(attempt);
            log_retry(attempt, max_attempts, class, &error, delay_ms);
            sleep(Duration::from_millis(delay_ms)).await;
            attempt += 1;
        }
    }
}

fn log_retry(attempt: u32, max: u32, class: ErrorClass, reason: &dyn Display, delay_ms: u64) {
    tracing::warn!(attempt, max, %class, "attempt failed: {reason}; retrying in {delay_ms}ms");
}
