use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stand-in for deadlines too far out to represent as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + duration`, saturating to a far-future instant instead of overflowing
#[must_use]
pub fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Why the run loop was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// `cancel()` was called on the token
    Cancelled,
    /// The optional run deadline passed first
    DeadlineExceeded,
}

/// Stop signal for the run loop: a cancellation token plus an optional deadline.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Shutdown {
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Also stop once `max_runtime` has elapsed from now
    #[must_use]
    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.deadline = Some(deadline_after(max_runtime));
        self
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once either the token is cancelled or the deadline passes
    pub async fn wait(&self) -> StopCause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => StopCause::Cancelled,
                    () = tokio::time::sleep_until(deadline) => StopCause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                StopCause::Cancelled
            }
        }
    }
}
