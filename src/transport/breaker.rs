//! Per-branch circuit breaker.
//!
//! A pure state machine over CLOSED → OPEN → HALF_OPEN. Time is always
//! passed in as a parameter, never sampled here, so transitions are
//! deterministic under test. The connection manager is the only caller and
//! sequences all access through the per-branch queue, making each record
//! single-writer.
//!
//! State machine:
//!
//! ```text
//! CLOSED ──(failures ≥ threshold)──▶ OPEN ──(backoff elapsed)──▶ HALF_OPEN
//!    ▲                                 ▲                            │
//!    │                                 └────────(probe fails)───────┤
//!    └──────────────────────(probe succeeds)────────────────────────┘
//! ```

use std::time::{Duration, Instant};

/// Default consecutive-failure threshold before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default backoff schedule. The index advances on every OPEN transition and
/// is capped at the last slot.
pub const DEFAULT_BACKOFF: [Duration; 5] = [
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
    Duration::from_secs(40),
    Duration::from_secs(60),
];

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Healthy; calls pass through.
    Closed,
    /// Failing fast; calls are rejected until the backoff elapses.
    Open,
    /// One probe call is allowed through to test recovery.
    HalfOpen,
}

/// Why the breaker gate rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerGate {
    /// The circuit is open; retry after the given interval.
    Open {
        /// Time remaining until the next half-open transition
        retry_in: Duration,
    },
    /// The circuit is half-open and the probe slot is taken.
    ProbeInFlight,
}

/// Breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Backoff schedule; the last entry repeats.
    pub backoff: Vec<Duration>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            backoff: DEFAULT_BACKOFF.to_vec(),
        }
    }
}

impl BreakerConfig {
    /// A fast profile for tests: threshold 3, sub-second backoff.
    #[must_use]
    pub fn fast_test_profile() -> Self {
        Self {
            failure_threshold: 3,
            backoff: vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ],
        }
    }
}

/// One branch's circuit-breaker record.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    next_retry: Option<Instant>,
    backoff_index: usize,
    probe_in_flight: bool,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Creates a CLOSED breaker.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            next_retry: None,
            backoff_index: 0,
            probe_in_flight: false,
            config,
        }
    }

    /// Current state, after applying the lazy OPEN → HALF_OPEN transition.
    /// For observability only; the gate is [`CircuitBreaker::check`].
    pub fn state(&mut self, now: Instant) -> BreakerState {
        self.refresh(now);
        self.state
    }

    /// Consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Instant of the most recent recorded failure.
    #[must_use]
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Gate check, run before any operation on the branch.
    ///
    /// Applies the lazy HALF_OPEN transition, then either admits the call
    /// (claiming the probe slot when half-open) or reports why it is gated.
    ///
    /// # Errors
    ///
    /// [`BreakerGate::Open`] while the backoff is running,
    /// [`BreakerGate::ProbeInFlight`] when another probe holds the slot.
    pub fn check(&mut self, now: Instant) -> Result<(), BreakerGate> {
        self.refresh(now);
        match self.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let retry_in = self
                    .next_retry
                    .map(|at| at.saturating_duration_since(now))
                    .unwrap_or_default();
                Err(BreakerGate::Open { retry_in })
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    Err(BreakerGate::ProbeInFlight)
                } else {
                    self.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful operation: close the circuit and zero the
    /// counters.
    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.backoff_index = 0;
        self.probe_in_flight = false;
    }

    /// Records a failed operation.
    ///
    /// Opens the circuit when the threshold is reached or when the failure
    /// happened under HALF_OPEN; each OPEN transition advances the backoff
    /// index, capped at the last slot.
    ///
    /// Returns `true` when this failure transitioned the breaker to OPEN,
    /// which is the manager's cue to drop the cached client.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.failure_count += 1;
        self.probe_in_flight = false;
        self.last_failure = Some(now);

        if self.failure_count >= self.config.failure_threshold
            || self.state == BreakerState::HalfOpen
        {
            self.state = BreakerState::Open;
            let slot = self.backoff_index.min(self.config.backoff.len() - 1);
            self.next_retry = Some(now + self.config.backoff[slot]);
            self.backoff_index = (self.backoff_index + 1).min(self.config.backoff.len() - 1);
            return true;
        }
        false
    }

    /// Lazy OPEN → HALF_OPEN transition once the backoff has elapsed.
    fn refresh(&mut self, now: Instant) {
        if self.state == BreakerState::Open {
            if let Some(at) = self.next_retry {
                if now >= at {
                    self.state = BreakerState::HalfOpen;
                    self.probe_in_flight = false;
                }
            }
        }
    }
}
