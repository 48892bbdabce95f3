//! Bounded waiting for push approvals.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{AuthBackend, AuthError, PushResponse};

/// Bounds of a push wait.
#[derive(Debug, Clone, Copy)]
pub struct PushWait {
    /// Overall time budget, after which the wait ends with
    /// [`PushResponse::Timeout`].
    pub deadline: Duration,
    /// Delay between two polls.
    pub poll_interval: Duration,
}

impl Default for PushWait {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Polls [`AuthBackend::validate_user_push`] until the challenge resolves,
/// the deadline passes or `cancel` fires.
///
/// # Errors
///
/// Returns [`AuthError::Cancelled`] when cancelled, or the first error the
/// backend reports.
pub async fn wait_for_push(
    backend: &dyn AuthBackend,
    username: &str,
    wait: PushWait,
    cancel: CancellationToken,
) -> Result<PushResponse, AuthError> {
    let deadline = Instant::now() + wait.deadline;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            answer = backend.validate_user_push(username) => answer?,
            _ = sleep_until(deadline) => {
                info!(user = %username, polls, "Push wait deadline reached during poll");
                return Ok(PushResponse::Timeout);
            },
        };

        if answer.is_terminal() {
            info!(user = %username, polls, answer = ?answer, "Push wait finished");
            return Ok(answer);
        }

        let next = Instant::now() + wait.poll_interval;
        if next >= deadline {
            info!(user = %username, polls, "Push wait deadline reached");
            return Ok(PushResponse::Timeout);
        }
        debug!(user = %username, polls, "Push still pending");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            _ = sleep_until(next) => {},
        }
    }
}
