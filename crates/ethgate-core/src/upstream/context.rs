//! Caller-supplied cancellation and deadline for node pool calls.
//!
//! The context is checked cooperatively: before each attempt and never in the middle of
//! one. An attempt that has started runs to completion or to its HTTP timeout, which is
//! clipped so it never outlives the deadline.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::UpstreamError;

/// Cancellation token plus optional deadline carried through a request.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { cancel: CancellationToken::new(), deadline: Some(Instant::now() + timeout) }
    }

    /// Attaches an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails if the caller has cancelled or the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Cancelled`] or [`UpstreamError::DeadlineExceeded`].
    pub fn ensure_active(&self) -> Result<(), UpstreamError> {
        if self.cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(UpstreamError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Per-attempt timeout: `base`, or less if the deadline is closer.
    #[must_use]
    pub fn attempt_timeout(&self, base: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => base.min(deadline.saturating_duration_since(Instant::now())),
            None => base,
        }
    }
}
