//! Gateway configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/industrial-gateway/gateway.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - Each `[[devices]]` entry's `id`, `protocol`, `address`

use gw_protocol::{ConfigValue, Device, ProtocolKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub schema_version: u32,
    pub devices: Vec<Device>,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_idle: usize,
    pub max_active: usize,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_probes: usize,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    devices: Option<Vec<RawDeviceConfig>>,
    pool: Option<RawPoolConfig>,
    cache: Option<RawCacheConfig>,
    resilience: Option<RawResilienceConfig>,
}

#[derive(Debug, Deserialize)]
struct RawDeviceConfig {
    id: Option<String>,
    protocol: Option<String>,
    address: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    config: HashMap<String, ConfigValue>,
}

#[derive(Debug, Deserialize)]
struct RawPoolConfig {
    max_idle: Option<usize>,
    max_active: Option<usize>,
    idle_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCacheConfig {
    max_size: Option<usize>,
    default_ttl_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawResilienceConfig {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    backoff_factor: Option<f64>,
    failure_threshold: Option<u32>,
    reset_timeout_ms: Option<u64>,
    half_open_probes: Option<usize>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load gateway config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load gateway config from the default path `/etc/industrial-gateway/gateway.toml`.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/industrial-gateway/gateway.toml"))
}

/// Load gateway config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_devices = raw.devices.unwrap_or_default();
    let mut devices = Vec::with_capacity(raw_devices.len());
    for (i, d) in raw_devices.into_iter().enumerate() {
        let id = d
            .id
            .ok_or_else(|| ConfigError::MissingField(format!("devices[{i}].id")))?;
        let protocol_str = d
            .protocol
            .ok_or_else(|| ConfigError::MissingField(format!("devices[{i}].protocol")))?;
        let protocol = match protocol_str.as_str() {
            "register_addressed" => ProtocolKind::RegisterAddressed,
            "object_addressed" => ProtocolKind::ObjectAddressed,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "devices[{i}].protocol: unrecognized value '{other}'"
                )))
            }
        };
        let address = d
            .address
            .ok_or_else(|| ConfigError::MissingField(format!("devices[{i}].address")))?;
        let port = d.port.unwrap_or(match protocol {
            ProtocolKind::RegisterAddressed => 502,
            ProtocolKind::ObjectAddressed => 44818,
        });
        devices.push(Device {
            id,
            protocol,
            address,
            port,
            config: d.config,
        });
    }

    let pool = match raw.pool {
        Some(p) => PoolConfig {
            max_idle: p.max_idle.unwrap_or(10),
            max_active: p.max_active.unwrap_or(100),
            idle_timeout_secs: p.idle_timeout_secs.unwrap_or(300),
            sweep_interval_secs: p.sweep_interval_secs.unwrap_or(60),
        },
        None => PoolConfig {
            max_idle: 10,
            max_active: 100,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        },
    };

    let cache = match raw.cache {
        Some(c) => CacheConfig {
            max_size: c.max_size.unwrap_or(10_000),
            default_ttl_ms: c.default_ttl_ms.unwrap_or(5_000),
        },
        None => CacheConfig {
            max_size: 10_000,
            default_ttl_ms: 5_000,
        },
    };

    let resilience = match raw.resilience {
        Some(r) => ResilienceConfig {
            max_attempts: r.max_attempts.unwrap_or(3),
            initial_backoff_ms: r.initial_backoff_ms.unwrap_or(100),
            max_backoff_ms: r.max_backoff_ms.unwrap_or(5_000),
            backoff_factor: r.backoff_factor.unwrap_or(2.0),
            failure_threshold: r.failure_threshold.unwrap_or(3),
            reset_timeout_ms: r.reset_timeout_ms.unwrap_or(30_000),
            half_open_probes: r.half_open_probes.unwrap_or(1),
        },
        None => ResilienceConfig {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            backoff_factor: 2.0,
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
            half_open_probes: 1,
        },
    };

    Ok(GatewayConfig {
        schema_version,
        devices,
        pool,
        cache,
        resilience,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_schema_version() {
        let err = load_config_from_str("").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "schema_version"));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let toml = r#"
            schema_version = 1
            [[devices]]
            id = "plc-1"
            protocol = "opc_ua"
            address = "10.0.0.5"
        "#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn defaults_port_from_protocol() {
        let toml = r#"
            schema_version = 1
            [[devices]]
            id = "plc-1"
            protocol = "register_addressed"
            address = "10.0.0.5"
        "#;
        let cfg = load_config_from_str(toml).unwrap();
        assert_eq!(cfg.devices[0].port, 502);
    }

    #[test]
    fn parses_full_config_with_overrides() {
        let toml = r#"
            schema_version = 1

            [[devices]]
            id = "plc-1"
            protocol = "register_addressed"
            address = "10.0.0.5"
            port = 502
              [devices.config]
              unit_id = 1
              timeout_ms = 2000

            [pool]
            max_idle = 5
            max_active = 50

            [cache]
            max_size = 500

            [resilience]
            max_attempts = 5
            backoff_factor = 1.5
        "#;
        let cfg = load_config_from_str(toml).unwrap();
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].config_u8("unit_id"), Some(1));
        assert_eq!(cfg.pool.max_idle, 5);
        assert_eq!(cfg.pool.idle_timeout_secs, 300);
        assert_eq!(cfg.cache.max_size, 500);
        assert_eq!(cfg.resilience.max_attempts, 5);
        assert_eq!(cfg.resilience.backoff_factor, 1.5);
    }

    #[test]
    fn load_config_from_path_reports_io_error_for_missing_file() {
        let err = load_config_from_path(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
