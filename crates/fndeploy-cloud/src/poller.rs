//! Long-running operation polling.
//!
//! ```text
//! Polling ──fetch──▶ error set        ──▶ Failed
//!    ▲      │       done              ──▶ Succeeded
//!    │      │       attempts exhausted ──▶ TimedOut
//!    │      │       token cancelled    ──▶ Cancelled
//!    └─sleep┘
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observer::DeployObserver;
use crate::operation::{Operation, OperationStatus};
use crate::rest::ApiError;

/// Fixed-interval poll bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the operation finishes.
    pub max_attempts: Option<u32>,
    /// Wall-clock limit checked at every iteration boundary.
    pub deadline: Option<Instant>,
}

impl PollPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    /// Poll forever at `interval`.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            deadline: None,
        }
    }

    /// Enough attempts to cover `timeout`; a zero timeout means unbounded.
    pub fn from_timeout(interval: Duration, timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::unbounded(interval);
        }
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms).max(1);
        Self {
            interval,
            max_attempts: Some(attempts.min(u128::from(u32::MAX)) as u32),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_timeout(Self::DEFAULT_INTERVAL, Duration::from_secs(300))
    }
}

/// Poll loop state.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Polling { attempts: u32 },
    Succeeded(Operation),
    Failed(OperationStatus),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Fetch an operation until it reaches a terminal state.
///
/// `fetch` is called once per attempt; `observer.on_poll` fires before each
/// call. An operation carrying an error fails immediately without sleeping.
/// Fetch errors are returned as-is: transient ones are already retried by the
/// transport.
pub async fn poll_operation<F, Fut>(
    mut fetch: F,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    observer: &mut dyn DeployObserver,
) -> Result<Operation, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Operation, ApiError>>,
{
    let mut state = PollState::Polling { attempts: 0 };
    loop {
        state = match state {
            PollState::Polling { attempts } => {
                if cancel.is_cancelled() {
                    PollState::Cancelled
                } else if policy.exhausted(attempts) {
                    PollState::TimedOut { attempts }
                } else {
                    step(&mut fetch, attempts + 1, policy, cancel, observer).await?
                }
            }
            PollState::Succeeded(op) => {
                tracing::debug!(operation = %op.name, "operation finished");
                return Ok(op);
            }
            PollState::Failed(status) => {
                return Err(PollError::OperationFailed {
                    code: status.code,
                    message: status.message,
                });
            }
            PollState::TimedOut { attempts } => return Err(PollError::TimedOut { attempts }),
            PollState::Cancelled => return Err(PollError::Cancelled),
        };
    }
}

async fn step<F, Fut>(
    fetch: &mut F,
    attempt: u32,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    observer: &mut dyn DeployObserver,
) -> Result<PollState, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Operation, ApiError>>,
{
    observer.on_poll(attempt);
    let op = fetch()
        .await
        .map_err(|e| PollError::Fetch { source: e })?;

    if let Some(status) = op.error {
        return Ok(PollState::Failed(status));
    }
    if op.done {
        return Ok(PollState::Succeeded(op));
    }
    if policy.exhausted(attempt) {
        return Ok(PollState::TimedOut { attempts: attempt });
    }

    tracing::debug!(operation = %op.name, attempt, "operation still running");
    let delay = match policy.deadline {
        Some(deadline) => policy
            .interval
            .min(deadline.saturating_duration_since(Instant::now())),
        None => policy.interval,
    };
    tokio::select! {
        () = cancel.cancelled() => Ok(PollState::Cancelled),
        () = tokio::time::sleep(delay) => Ok(PollState::Polling { attempts: attempt }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to fetch operation")]
    Fetch { source: ApiError },

    #[error("Operation failed: {message} (code {code})")]
    OperationFailed { code: i32, message: String },

    #[error("Operation timed out after {attempts} polls")]
    TimedOut { attempts: u32 },

    #[error("operation polling cancelled")]
    Cancelled,
}
