//! gw-core: the gateway's engine room.
//!
//! Wires the wire-agnostic types in `gw-protocol` and the two codec crates
//! into a running system: connection pools, session FSMs, resilience
//! (retry/circuit-breaking), batching, caching, and live diagnostics, all
//! behind the per-protocol `ProtocolHandler`s and the northbound `Gateway`
//! facade.

mod batch;
mod cache;
mod diagnostics;
mod error;
mod gateway;
mod handler;
mod pool;
mod resilience;
mod session;

pub use batch::{plan_object_batches, plan_register_batches, AddressedTag, RegisterBatch};
pub use cache::{CacheStats, TagCache};
pub use diagnostics::LiveDiagnostics;
pub use error::GatewayError;
pub use gateway::{Gateway, SubscriptionId};
pub use handler::{HandlerRegistry, ObjectAddressedHandler, ProtocolHandler, RegisterAddressedHandler};
pub use pool::{ConnectionPool, Lease};
pub use resilience::{retry, is_retryable, CircuitBreaker, Probe, RetryPolicy};
pub use session::{CipSessionDriver, ModbusSessionDriver, SessionDriver, SessionError, SessionState};
