//! Circuit breaker: closed → open on repeated failure, open → half-open
//! after a reset timeout, half-open → closed on a successful probe or
//! back to open on a failed one.
//!
//! Only one caller may hold the half-open slot at a time — probing with
//! several concurrent requests the instant the reset timeout elapses would
//! hammer a device that just started recovering. This serializes half-open
//! probes behind a single-permit semaphore rather than an ad hoc flag.

use crate::error::GatewayError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

/// A permit that must be returned via `record_success`/`record_failure`
/// after the guarded call completes.
pub struct Probe<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

pub struct CircuitBreaker {
    device_id: String,
    state: Mutex<BreakerState>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_slot: Semaphore,
}

impl CircuitBreaker {
    pub fn new(device_id: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self::with_half_open_probes(device_id, failure_threshold, reset_timeout, 1)
    }

    /// As `new`, but allowing more than one concurrent half-open probe —
    /// the `half_open_probes` field of a device's `ResilienceConfig`.
    pub fn with_half_open_probes(
        device_id: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        half_open_probes: u32,
    ) -> Self {
        CircuitBreaker {
            device_id: device_id.into(),
            state: Mutex::new(BreakerState::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold,
            reset_timeout,
            half_open_slot: Semaphore::new(half_open_probes.max(1) as usize),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Checks out a `Probe` for the call about to be made, or rejects it
    /// with `CircuitOpen` if the breaker hasn't reached its reset timeout
    /// yet, or if another probe already holds the half-open slot.
    pub fn try_acquire(&self) -> Result<Probe<'_>, GatewayError> {
        let mut state = self.lock_state();
        match *state {
            BreakerState::Closed => Ok(Probe { _permit: None }),
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() < self.reset_timeout {
                    return Err(GatewayError::CircuitOpen(self.device_id.clone()));
                }
                *state = BreakerState::HalfOpen;
                drop(state);
                tracing::info!(device_id = %self.device_id, "breaker reset timeout elapsed, probing half-open");
                self.acquire_half_open_slot()
            }
            BreakerState::HalfOpen => {
                drop(state);
                self.acquire_half_open_slot()
            }
        }
    }

    fn acquire_half_open_slot(&self) -> Result<Probe<'_>, GatewayError> {
        match self.half_open_slot.try_acquire() {
            Ok(permit) => Ok(Probe {
                _permit: Some(permit),
            }),
            Err(_) => Err(GatewayError::CircuitOpen(self.device_id.clone())),
        }
    }

    pub fn record_success(&self, _probe: Probe<'_>) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut state = self.lock_state();
        if !matches!(*state, BreakerState::Closed) {
            tracing::info!(device_id = %self.device_id, "breaker closed after a successful probe");
        }
        *state = BreakerState::Closed;
    }

    pub fn record_failure(&self, _probe: Probe<'_>) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.lock_state();
        if matches!(*state, BreakerState::HalfOpen) || count >= self.failure_threshold {
            if !matches!(*state, BreakerState::Open { .. }) {
                tracing::warn!(device_id = %self.device_id, failures = count, "breaker opened");
            }
            *state = BreakerState::Open {
                opened_at: Instant::now(),
            };
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), BreakerState::Open { .. })
    }
}
