//! Bounded polling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{Clock, PollError};

/// Fixed-interval polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between probes.
    pub interval: Duration,
    /// Upper bound on probes.
    pub max_attempts: u32,
    /// Wait one interval before the first probe.
    pub sleep_before_first: bool,
}

impl PollPolicy {
    /// Policy for external scoring jobs: wait, then check, up to 1440 times.
    pub const fn scoring() -> Self {
        Self {
            interval: crate::SCORE_POLL_INTERVAL,
            max_attempts: crate::SCORE_POLL_ATTEMPTS,
            sleep_before_first: true,
        }
    }

    /// Policy for soft-delete acknowledgement: check, then wait, up to 40 times.
    pub const fn deletion() -> Self {
        Self {
            interval: crate::DELETE_POLL_INTERVAL,
            max_attempts: crate::DELETE_POLL_ATTEMPTS,
            sleep_before_first: false,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Upper bound on the time a poll can take, ignoring probe latency.
    pub fn budget(&self) -> Duration {
        let sleeps = if self.sleep_before_first {
            self.max_attempts
        } else {
            self.max_attempts.saturating_sub(1)
        };
        self.interval * sleeps
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// Not terminal yet.
    Pending,
    /// Terminal success.
    Ready(T),
    /// Terminal failure with a description from the remote side.
    Failed(String),
}

/// A cancellation receiver that never fires.
pub fn never_cancelled() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Probe `resource` until it reaches a terminal state.
///
/// The probe receives the 1-based attempt number. Errors returned by the probe
/// abort the poll immediately.
///
/// # Errors
///
/// `PollError::Failed` on a terminal failure, `PollError::Timeout` after
/// `max_attempts` non-terminal probes, `PollError::Cancelled` if `cancel` flips
/// to `true` while waiting.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    clock: &dyn Clock,
    cancel: &mut watch::Receiver<bool>,
    resource: &str,
    mut probe: F,
) -> Result<T, E>
where
    E: From<PollError>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if (attempt > 1 || policy.sleep_before_first)
            && wait(clock, policy.interval, cancel).await
        {
            warn!(resource = %resource, attempt, "poll cancelled");
            return Err(PollError::Cancelled {
                resource: resource.to_string(),
            }
            .into());
        }

        match probe(attempt).await? {
            PollOutcome::Ready(value) => {
                debug!(resource = %resource, attempt, "poll reached terminal state");
                return Ok(value);
            }
            PollOutcome::Failed(description) => {
                return Err(PollError::Failed {
                    resource: resource.to_string(),
                    description,
                }
                .into());
            }
            PollOutcome::Pending => {
                debug!(
                    resource = %resource,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "still pending"
                );
            }
        }
    }

    Err(PollError::Timeout {
        resource: resource.to_string(),
        attempts: policy.max_attempts,
    }
    .into())
}

/// Sleep one interval; returns true if cancelled first.
async fn wait(clock: &dyn Clock, interval: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return true;
    }

    let mut sleep = clock.sleep(interval);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow_and_update() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone: nobody can cancel any more.
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}
