//! Circuit breaker shared by every request to the quote provider.
//!
//! The quote provider answers an IP ban with HTTP 403 and rate limiting with
//! repeated 429s. Once the breaker opens, every remaining ticker in the run
//! fails fast instead of extending the ban.

use std::cell::Cell;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests are allowed.
    Closed,
    /// Requests are refused until the cooldown expires.
    Open { opened_at: Instant },
}

/// Single-threaded circuit breaker. The pipeline issues one request at a
/// time, so interior mutability through `Cell` is enough.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Cell<BreakerState>,
    consecutive_failures: Cell<u32>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Cell::new(BreakerState::Closed),
            consecutive_failures: Cell::new(0),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Five consecutive failures open the breaker for ten minutes. A batch
    /// job that runs once a day gains nothing from waiting longer.
    pub fn for_batch_job() -> Self {
        Self::new(5, Duration::from_secs(10 * 60))
    }

    pub fn state(&self) -> BreakerState {
        self.state.get()
    }

    pub fn is_allowed(&self) -> bool {
        match self.state.get() {
            BreakerState::Closed => true,
            BreakerState::Open { opened_at } if opened_at.elapsed() >= self.cooldown => {
                self.state.set(BreakerState::Closed);
                self.consecutive_failures.set(0);
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.set(0);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.get() + 1;
        self.consecutive_failures.set(failures);
        if failures >= self.failure_threshold {
            self.open();
        }
    }

    /// Open immediately (HTTP 403).
    pub fn open(&self) {
        self.state.set(BreakerState::Open {
            opened_at: Instant::now(),
        });
    }
}
