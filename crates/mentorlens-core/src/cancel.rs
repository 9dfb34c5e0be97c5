//! Cooperative cancellation
//!
//! In-flight requests cannot be aborted at the transport, so relevance is
//! checked right before a result is applied. Two signals feed that check:
//!
//! - [`CancellationToken`]: flipped when the owner (a widget or a poll
//!   subscription) is torn down
//! - [`EpochClock`]: every new request advances the clock, making all older
//!   requests stale
//!
//! A [`Ticket`] pairs both, and both the fetch orchestrator and the poller
//! use it as their single "still relevant" contract.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Monotonic request tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation signal
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new non-cancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every waiter
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            // registered before the check so a concurrent cancel is not missed
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Issues epochs; only the latest one is current
#[derive(Debug, Default)]
pub struct EpochClock {
    latest: AtomicU64,
}

impl EpochClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, staling every older one
    pub fn advance(&self) -> Epoch {
        Epoch(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    #[inline]
    #[must_use]
    pub fn latest(&self) -> Epoch {
        Epoch(self.latest.load(Ordering::Acquire))
    }

    #[inline]
    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.latest() == epoch
    }
}

/// Relevance check carried by one request
#[derive(Debug, Clone)]
pub struct Ticket {
    epoch: Epoch,
    clock: Arc<EpochClock>,
    token: CancellationToken,
}

impl Ticket {
    /// Issue a ticket on `clock`, advancing it
    #[must_use]
    pub fn issue(clock: &Arc<EpochClock>, token: &CancellationToken) -> Self {
        Self {
            epoch: clock.advance(),
            clock: Arc::clone(clock),
            token: token.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Owner alive and no newer request issued
    #[inline]
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        !self.token.is_cancelled() && self.clock.is_current(self.epoch)
    }

    /// Owner was torn down
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[inline]
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
