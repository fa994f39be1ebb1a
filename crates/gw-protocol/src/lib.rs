// gw-protocol: Shared, wire-agnostic data model for the protocol gateway.
//
// These types carry no I/O and no protocol-specific framing; they are the
// common currency the codec crates, gw-core, and any northbound transport
// agree on. Mirrors the role rt-protocol plays for the remote forwarding
// suite: one crate of serde-derived types, nothing else.

mod address;
mod device;
mod diagnostics;
mod error;
mod tag;
mod value;

pub use address::{FunctionCode, ParsedAddress};
pub use device::{ConfigValue, Device, ProtocolKind};
pub use diagnostics::{
    DeviceDiagnostics, ErrorRing, HealthStatus, IdentitySnapshot, PerformanceSample, PingResult,
    SessionSnapshot, TransportCounters,
};
pub use error::{ErrorCategory, ErrorRecord};
pub use tag::{DataType, Tag};
pub use value::{Quality, RawValue, Value};
