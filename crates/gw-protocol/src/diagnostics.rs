use crate::ErrorRecord;
use serde::{Deserialize, Serialize};

/// Session-layer diagnostics (spec §4.8).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_handle: u32,
    pub uptime_secs: u64,
    pub sequence_number: u32,
    pub requests_sent: u64,
    pub responses_received: u64,
}

/// Transport-layer byte/packet counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub retransmits: u64,
    pub last_network_error: Option<String>,
}

/// CIP-layer Identity Object fields (Volume 1 §5-2), empty/zeroed for
/// protocols that have no identity object (register-addressed devices).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub vendor_id: Option<u16>,
    pub device_type: Option<u16>,
    pub product_code: Option<u16>,
    pub revision: Option<(u8, u8)>,
    pub serial_number: Option<u32>,
    pub product_name: Option<String>,
}

/// Request-latency performance sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub min_request_ms: f64,
    pub avg_request_ms: f64,
    pub max_request_ms: f64,
    pub requests_per_sec: f64,
}

/// A bounded ring of the most recent errors for a device, newest last.
pub type ErrorRing = Vec<ErrorRecord>;

/// The result of a `ping(device)` call: reachability plus round-trip
/// latency. `ping` never throws — an unreachable device is `reachable:
/// false` with `latency_ms: 0.0`, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub reachable: bool,
    pub latency_ms: f64,
}

impl PingResult {
    pub fn reachable(latency_ms: f64) -> Self {
        PingResult {
            reachable: true,
            latency_ms,
        }
    }

    pub fn unreachable() -> Self {
        PingResult::default()
    }
}

/// Overall device health, synthesized by `health_check` from connectivity,
/// session freshness, and average request time (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// A point-in-time, read-only snapshot of a device's diagnostics. Produced
/// by `gw-core`'s live `DeviceDiagnostics` via a `.snapshot()` call; this
/// type itself holds no atomics and can be freely cloned/serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDiagnostics {
    pub device_id: String,
    pub session: SessionSnapshot,
    pub transport: TransportCounters,
    pub identity: IdentitySnapshot,
    pub performance: PerformanceSample,
    pub recent_errors: ErrorRing,
    pub health: HealthStatus,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    #[test]
    fn default_diagnostics_is_healthy_and_empty() {
        let diag = DeviceDiagnostics::default();
        assert_eq!(diag.health, HealthStatus::Healthy);
        assert!(diag.recent_errors.is_empty());
    }

    #[test]
    fn error_ring_holds_records_in_insertion_order() {
        let mut diag = DeviceDiagnostics::default();
        diag.recent_errors
            .push(ErrorRecord::new(ErrorCategory::Timeout, "read_tags"));
        diag.recent_errors
            .push(ErrorRecord::new(ErrorCategory::Dial, "connect"));
        assert_eq!(diag.recent_errors[0].operation, "read_tags");
        assert_eq!(diag.recent_errors[1].operation, "connect");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut diag = DeviceDiagnostics::default();
        diag.device_id = "plc-1".into();
        diag.health = HealthStatus::Warning;
        let json = serde_json::to_string(&diag).unwrap();
        let back: DeviceDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }
}
