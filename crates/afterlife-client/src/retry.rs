//! Ordered fallback across redundant endpoints.
//!
//! A [`RetryPolicy`] is a value, not control flow: the query and fetch
//! clients hand it their endpoint list and an attempt closure. Targets are
//! tried strictly in order; after a failed attempt the policy sleeps a fixed
//! delay (no backoff) and moves on. The first success stops the loop.

use std::future::Future;
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(120);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(12);

/// Why a single attempt against one endpoint failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("query rejected: {0}")]
    Declared(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    #[error("no endpoints configured")]
    NoTargets,
    #[error("all {attempts} endpoints failed; last ({target}): {last}")]
    Exhausted {
        attempts: usize,
        target: String,
        last: AttemptError,
    },
}

/// A successful attempt plus where and when it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub target: String,
    /// 1-based count of attempts made, including the successful one.
    pub attempts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause after a failed attempt before trying the next target.
    pub delay: Duration,
    /// Upper bound for one attempt; exceeding it counts as a failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            delay,
            attempt_timeout,
        }
    }

    /// Run `attempt` against each target in order until one succeeds.
    ///
    /// Exactly one attempt is made per target. On exhaustion the error carries
    /// the last target's failure.
    pub async fn run<T, F, Fut>(
        &self,
        targets: &[String],
        mut attempt: F,
    ) -> Result<Attempted<T>, FallbackError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut last: Option<(String, AttemptError)> = None;

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }

            let outcome = tokio::time::timeout(self.attempt_timeout, attempt(target.clone()))
                .await
                .unwrap_or(Err(AttemptError::TimedOut(self.attempt_timeout)));

            match outcome {
                Ok(value) => {
                    tracing::debug!(endpoint = %target, attempts = i + 1, "endpoint succeeded");
                    return Ok(Attempted {
                        value,
                        target: target.clone(),
                        attempts: i + 1,
                    });
                }
                Err(error) => {
                    tracing::warn!(endpoint = %target, attempt = i + 1, %error, "endpoint failed");
                    last = Some((target.clone(), error));
                }
            }
        }

        match last {
            None => Err(FallbackError::NoTargets),
            Some((target, last)) => Err(FallbackError::Exhausted {
                attempts: targets.len(),
                target,
                last,
            }),
        }
    }
}
