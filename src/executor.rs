//! Retry/timeout executor for remote store operations.
//!
//! Every attempt is spawned as its own task and raced against a timer. When
//! the timer wins the executor stops waiting, but the spawned call is left
//! to finish on its own and its late result is dropped. Attempts are
//! strictly sequential: attempt n+1 never starts before attempt n has
//! resolved or timed out.

use backon::{ExponentialBuilder, Retryable};
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::remote::RemoteError;

/// Attempt budget for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub attempt_timeout: Duration,
  pub backoff_base: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 2,
      attempt_timeout: Duration::from_millis(12_000),
      backoff_base: Duration::from_millis(1_000),
    }
  }
}

impl RetryPolicy {
  /// Create a validated policy.
  pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff_base: Duration) -> Result<Self> {
    if max_attempts == 0 {
      return Err(eyre!("max_attempts must be at least 1"));
    }
    if attempt_timeout.is_zero() {
      return Err(eyre!("attempt timeout must be greater than zero"));
    }
    Ok(Self {
      max_attempts,
      attempt_timeout,
      backoff_base,
    })
  }

  pub fn with_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts.max(1);
    self
  }

  pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
    self.attempt_timeout = attempt_timeout;
    self
  }

  /// Delay to wait before starting `attempt` (1-based).
  ///
  /// The first attempt starts immediately; attempt n >= 2 waits
  /// `backoff_base * 2^(n-2)`.
  pub fn backoff_delay(&self, attempt: u32) -> Duration {
    if attempt < 2 {
      return Duration::ZERO;
    }
    let exponent = (attempt - 2).min(31);
    self.backoff_base.saturating_mul(1u32 << exponent)
  }

  /// Exponential schedule without jitter, capped at the last delay so the
  /// builder's default ceiling never clamps it.
  fn backoff(&self) -> ExponentialBuilder {
    let max_attempts = self.max_attempts.max(1);
    ExponentialBuilder::default()
      .with_min_delay(self.backoff_base)
      .with_factor(2.0)
      .with_max_delay(self.backoff_delay(max_attempts).max(self.backoff_base))
      .with_max_times(max_attempts as usize - 1)
  }
}

/// Runs remote operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Executor {
  policy: RetryPolicy,
}

impl Executor {
  pub fn new(policy: RetryPolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> RetryPolicy {
    self.policy
  }

  /// Run a read with the executor's default policy.
  ///
  /// Failures never escape: after the last failed attempt `default` is
  /// returned.
  pub async fn run<T, F, Fut>(&self, label: &str, default: T, op: F) -> T
  where
    T: Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
  {
    self.run_with(&self.policy, label, default, op).await
  }

  /// Run a read with an explicit policy.
  pub async fn run_with<T, F, Fut>(&self, policy: &RetryPolicy, label: &str, default: T, op: F) -> T
  where
    T: Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
  {
    attempt_loop(policy, label, op).await.unwrap_or(default)
  }

  /// Run an operation that is safe to repeat and hand back the last error.
  ///
  /// Only idempotent writes (upserts keyed by a natural composite key) go
  /// through here.
  pub async fn try_run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, StoreError>
  where
    T: Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
  {
    attempt_loop(&self.policy, label, op).await
  }
}

async fn attempt_loop<T, F, Fut>(
  policy: &RetryPolicy,
  label: &str,
  mut op: F,
) -> Result<T, StoreError>
where
  T: Send + 'static,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 0;

  (|| {
    attempt += 1;
    run_attempt(policy.attempt_timeout, label, attempt, max_attempts, op())
  })
  .retry(policy.backoff())
  .notify(|err: &StoreError, delay: Duration| {
    debug!(label, "retrying after {}ms: {}", delay.as_millis(), err)
  })
  .await
}

async fn run_attempt<T, Fut>(
  timeout: Duration,
  label: &str,
  attempt: u32,
  max_attempts: u32,
  fut: Fut,
) -> Result<T, StoreError>
where
  T: Send + 'static,
  Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
  // Dropping the handle on timeout detaches the task instead of aborting it.
  let handle = tokio::spawn(fut);
  let result = match tokio::time::timeout(timeout, handle).await {
    Ok(Ok(result)) => result,
    Ok(Err(join_err)) => Err(StoreError::Remote(RemoteError::Aborted(join_err.to_string()))),
    Err(_) => Err(StoreError::Timeout {
      label: label.to_string(),
      after: timeout,
    }),
  };

  match &result {
    Err(err) if err.is_timeout() => {
      error!(label, attempt, max_attempts, "attempt timed out: {}", err)
    }
    Err(err) => warn!(label, attempt, max_attempts, "attempt failed: {}", err),
    Ok(_) => {}
  }
  result
}
