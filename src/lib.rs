//! industrial-gateway: workspace root.
//!
//! This crate carries only the end-to-end integration test suite (see
//! `tests/integration/`). The implementation lives in the library crates
//! under `crates/`: `gw-protocol` (data model), `modbus-codec` /
//! `cip-codec` (wire codecs), `gw-core` (session/pool/cache/batcher/
//! resilience/diagnostics/handler facade), and `gw-test-utils` (mock
//! device servers used by the integration tests).
