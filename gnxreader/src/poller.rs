//! Polling and retry primitives
//!
//! [`retry`] runs a check until it reports a value, the attempt budget is
//! spent, or a [`CancellationToken`] fires. [`AssetPoller`] wraps it with an
//! owned token for readiness polling of generated assets.
//!
//! Every check counts as an attempt, whether it answered "not ready" or
//! failed with an error. No delay follows the last attempt.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default readiness budget for generated images: 30 checks, 2 s apart
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default retry budget for audio fetches: 3 attempts, 1 s * n backoff
pub const DEFAULT_AUDIO_RETRY_COUNT: u32 = 3;
pub const DEFAULT_AUDIO_BACKOFF_STEP: Duration = Duration::from_millis(1000);

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T, E> {
    Ready(T),
    NotReady,
    Failed(E),
}

impl<T, E> From<Result<Option<T>, E>> for Attempt<T, E> {
    fn from(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => Attempt::Ready(value),
            Ok(None) => Attempt::NotReady,
            Err(err) => Attempt::Failed(err),
        }
    }
}

/// Delay policy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt
    Constant(Duration),
    /// `step * n` after the n-th attempt
    Linear(Duration),
}

impl Backoff {
    /// Delay to wait after attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Constant(delay) => delay,
            Backoff::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn constant(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Constant(interval),
        }
    }

    pub const fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear(step),
        }
    }

    /// 30 attempts, 2000 ms apart
    pub const fn image_polling() -> Self {
        Self::constant(DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }

    /// 3 attempts, 1000 ms then 2000 ms between them
    pub const fn audio_fetch() -> Self {
        Self::linear(DEFAULT_AUDIO_RETRY_COUNT, DEFAULT_AUDIO_BACKOFF_STEP)
    }

    /// Same backoff, different attempt budget
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::image_polling()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Debug> {
    /// Every attempt answered "not ready" or failed
    #[error("Gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        /// Error of the most recent failed attempt, if any attempt failed
        last_error: Option<E>,
    },

    #[error("Cancelled")]
    Cancelled,
}

/// Run `check` until it is ready, the budget is spent or `cancel` fires.
///
/// The check receives the 1-based attempt number. A check in flight when
/// the token is cancelled is dropped, so no check result is observed after
/// cancellation.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, RetryError<E>>
where
    E: Debug,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = check(attempt) => outcome,
        };

        match outcome {
            Attempt::Ready(value) => {
                trace!(attempt, "Check ready");
                return Ok(value);
            }
            Attempt::NotReady => {
                trace!(attempt, max_attempts = policy.max_attempts, "Check not ready");
            }
            Attempt::Failed(err) => {
                debug!(attempt, max_attempts = policy.max_attempts, error = ?err, "Check failed");
                last_error = Some(err);
            }
        }

        if attempt < policy.max_attempts {
            let delay = policy.backoff.delay_after(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E: Debug> {
    #[error("Not ready after {attempts} attempts")]
    Timeout {
        attempts: u32,
        last_error: Option<E>,
    },

    /// The poller was disposed; callers must discard this result
    #[error("Polling cancelled")]
    Cancelled,
}

impl<E: Debug> From<RetryError<E>> for PollError<E> {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => PollError::Timeout {
                attempts,
                last_error,
            },
            RetryError::Cancelled => PollError::Cancelled,
        }
    }
}

/// Readiness poller with its own cancellation token
///
/// ```no_run
/// # use gnxreader::poller::{AssetPoller, Attempt, RetryPolicy};
/// # async fn example() {
/// let poller = AssetPoller::new(RetryPolicy::image_polling());
/// let url = poller
///     .poll(|_attempt| async { Attempt::<String, ()>::NotReady })
///     .await;
/// assert!(url.is_err());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AssetPoller {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl AssetPoller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_token(policy, CancellationToken::new())
    }

    /// Poller cancelled by `cancel` (or by [`AssetPoller::dispose`])
    pub fn with_token(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn poll<T, E, F, Fut>(&self, check: F) -> Result<T, PollError<E>>
    where
        E: Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        retry(&self.policy, &self.cancel, check)
            .await
            .map_err(PollError::from)
    }

    /// Stop polling: no check is issued after this call
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}
