//! Live, per-device diagnostics: atomic counters plus a bounded error ring,
//! producing the read-only `gw_protocol::DeviceDiagnostics` snapshot that
//! crosses the northbound boundary.
//!
//! The error ring is modeled directly on `rt-ui-log`'s `UiLogger`: a
//! `VecDeque` capped at a fixed size, oldest entry evicted first.

use gw_protocol::{
    DeviceDiagnostics, ErrorRecord, HealthStatus, IdentitySnapshot, PerformanceSample,
    SessionSnapshot, TransportCounters,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const DEFAULT_MAX_ERRORS: usize = 50;
const DEFAULT_MAX_PERF_SAMPLES: usize = 100;
const WARNING_AVG_MS: f64 = 250.0;
const CRITICAL_AVG_MS: f64 = 1000.0;

struct MutableState {
    connected_at: Option<Instant>,
    identity: IdentitySnapshot,
    request_times_ms: VecDeque<f64>,
    errors: VecDeque<ErrorRecord>,
    last_network_error: Option<String>,
}

/// The live, mutable diagnostics a handler updates as it drives a device.
pub struct LiveDiagnostics {
    device_id: String,
    max_errors: usize,
    max_perf_samples: usize,
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    retransmits: AtomicU64,
    session_handle: AtomicU32,
    sequence_number: AtomicU32,
    state: Mutex<MutableState>,
}

impl LiveDiagnostics {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self::with_capacity(device_id, DEFAULT_MAX_ERRORS, DEFAULT_MAX_PERF_SAMPLES)
    }

    pub fn with_capacity(device_id: impl Into<String>, max_errors: usize, max_perf_samples: usize) -> Self {
        LiveDiagnostics {
            device_id: device_id.into(),
            max_errors,
            max_perf_samples,
            requests_sent: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            retransmits: AtomicU64::new(0),
            session_handle: AtomicU32::new(0),
            sequence_number: AtomicU32::new(0),
            state: Mutex::new(MutableState {
                connected_at: None,
                identity: IdentitySnapshot::default(),
                request_times_ms: VecDeque::new(),
                errors: VecDeque::new(),
                last_network_error: None,
            }),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MutableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_request_sent(&self, bytes: u64) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.sequence_number.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_received(&self, bytes: u64, elapsed_ms: f64) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        let mut state = self.lock_state();
        state.request_times_ms.push_back(elapsed_ms);
        while state.request_times_ms.len() > self.max_perf_samples {
            state.request_times_ms.pop_front();
        }
    }

    pub fn record_retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_error(&self, message: impl Into<String>) {
        self.lock_state().last_network_error = Some(message.into());
    }

    pub fn record_error(&self, record: ErrorRecord) {
        let mut state = self.lock_state();
        state.errors.push_back(record);
        while state.errors.len() > self.max_errors {
            state.errors.pop_front();
        }
    }

    pub fn set_session_established(&self, session_handle: u32) {
        self.session_handle.store(session_handle, Ordering::Relaxed);
        self.lock_state().connected_at = Some(Instant::now());
    }

    pub fn set_disconnected(&self) {
        self.session_handle.store(0, Ordering::Relaxed);
        self.lock_state().connected_at = None;
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().connected_at.is_some()
    }

    pub fn set_identity(&self, identity: IdentitySnapshot) {
        self.lock_state().identity = identity;
    }

    fn average_request_ms(&self) -> f64 {
        let state = self.lock_state();
        if state.request_times_ms.is_empty() {
            return 0.0;
        }
        state.request_times_ms.iter().sum::<f64>() / state.request_times_ms.len() as f64
    }

    /// Synthesizes overall health from connectivity, session freshness,
    /// and average request latency.
    pub fn health_check(&self) -> HealthStatus {
        let connected = self.lock_state().connected_at.is_some();
        if !connected {
            return HealthStatus::Critical;
        }
        let avg = self.average_request_ms();
        if avg > CRITICAL_AVG_MS {
            return HealthStatus::Critical;
        }
        let has_recent_errors = !self.lock_state().errors.is_empty();
        if avg > WARNING_AVG_MS || has_recent_errors {
            return HealthStatus::Warning;
        }
        HealthStatus::Healthy
    }

    /// Produces a read-only snapshot for the northbound diagnostics API.
    pub fn snapshot(&self) -> DeviceDiagnostics {
        let state = self.lock_state();
        let uptime_secs = state.connected_at.map(|t| t.elapsed().as_secs()).unwrap_or(0);
        let times = &state.request_times_ms;
        let performance = if times.is_empty() {
            PerformanceSample::default()
        } else {
            PerformanceSample {
                min_request_ms: times.iter().cloned().fold(f64::INFINITY, f64::min),
                avg_request_ms: times.iter().sum::<f64>() / times.len() as f64,
                max_request_ms: times.iter().cloned().fold(0.0, f64::max),
                requests_per_sec: 0.0,
            }
        };
        drop(state);

        let state = self.lock_state();
        DeviceDiagnostics {
            device_id: self.device_id.clone(),
            session: SessionSnapshot {
                session_handle: self.session_handle.load(Ordering::Relaxed),
                uptime_secs,
                sequence_number: self.sequence_number.load(Ordering::Relaxed),
                requests_sent: self.requests_sent.load(Ordering::Relaxed),
                responses_received: self.responses_received.load(Ordering::Relaxed),
            },
            transport: TransportCounters {
                bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
                bytes_received: self.bytes_received.load(Ordering::Relaxed),
                packets_sent: self.requests_sent.load(Ordering::Relaxed),
                packets_received: self.responses_received.load(Ordering::Relaxed),
                retransmits: self.retransmits.load(Ordering::Relaxed),
                last_network_error: state.last_network_error.clone(),
            },
            identity: state.identity.clone(),
            performance,
            recent_errors: state.errors.iter().cloned().collect(),
            health: self.health_check(),
        }
    }
}
