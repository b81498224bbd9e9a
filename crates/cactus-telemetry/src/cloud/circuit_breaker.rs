//! Circuit breaker for the cloud collector endpoint.
//!
//! After enough consecutive failures the breaker opens and uploads are skipped
//! (batches go straight to the failed queue) until the open window expires.
//! One probe is then let through; its outcome closes or reopens the breaker.
//!
//! ```text
//! CLOSED ──[failures >= threshold]──► OPEN ──[window elapsed]──► HALF-OPEN
//!   ▲                                  ▲                            │
//!   └────────────[probe ok]────────────┼────────[probe failed]──────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open, in milliseconds.
    pub open_duration_ms: u64,
    /// Probe requests allowed while half-open.
    pub half_open_max: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration_ms: 30_000,
            half_open_max: 1,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Lock-free circuit breaker shared between the forwarder and its callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    opened_at_ms: AtomicU64,
    probes: AtomicU32,
    config: CircuitConfig,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            probes: AtomicU32::new(0),
            config,
        }
    }

    /// Whether an upload may be attempted now.
    ///
    /// An open circuit whose window has elapsed moves to half-open and admits
    /// up to `half_open_max` probes.
    pub fn can_send(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            CLOSED => true,
            OPEN => {
                let elapsed = now_ms().saturating_sub(self.opened_at_ms.load(Ordering::SeqCst));
                if elapsed < self.config.open_duration_ms {
                    return false;
                }
                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.probes.store(0, Ordering::SeqCst);
                }
                self.take_probe()
            }
            HALF_OPEN => self.take_probe(),
            _ => false,
        }
    }

    /// Whether `can_send` would admit an attempt, without changing state or
    /// using up a half-open attempt.
    pub fn allows_attempt(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            CLOSED => true,
            OPEN => {
                let elapsed = now_ms().saturating_sub(self.opened_at_ms.load(Ordering::SeqCst));
                elapsed >= self.config.open_duration_ms
            }
            HALF_OPEN => self.probes.load(Ordering::SeqCst) < self.config.half_open_max,
            _ => false,
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
        let _ = self
            .state
            .compare_exchange(HALF_OPEN, CLOSED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        match self.state.load(Ordering::SeqCst) {
            CLOSED => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            HALF_OPEN => self.open(),
            _ => {}
        }
    }

    /// The collector asked us to back off; open immediately.
    pub fn record_rate_limited(&self) {
        self.open();
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.state.store(CLOSED, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
        self.probes.store(0, Ordering::SeqCst);
    }

    fn take_probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst) < self.config.half_open_max
    }

    fn open(&self) {
        self.opened_at_ms.store(now_ms(), Ordering::SeqCst);
        self.probes.store(0, Ordering::SeqCst);
        self.state.store(OPEN, Ordering::SeqCst);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
