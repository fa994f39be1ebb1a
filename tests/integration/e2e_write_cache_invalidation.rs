//! A write through `Gateway` invalidates the tag's cache entry so the next
//! read observes the new value instead of the value cached before the
//! write.

use gw_core::{Gateway, HandlerRegistry, RegisterAddressedHandler, RetryPolicy};
use gw_protocol::{DataType, Device, ProtocolKind, RawValue, Tag};
use gw_test_utils::MockModbusServer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn gateway() -> Gateway {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RegisterAddressedHandler::new(
        100,
        Duration::from_secs(60),
        RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(50)),
    )));
    Gateway::new(registry)
}

fn device(port: u16) -> Device {
    Device {
        id: "plc-1".to_string(),
        protocol: ProtocolKind::RegisterAddressed,
        address: "127.0.0.1".to_string(),
        port,
        config: HashMap::new(),
    }
}

#[tokio::test]
async fn stale_cached_value_survives_until_a_write_invalidates_it() {
    let server = MockModbusServer::start().await.unwrap();
    // tag "40020" zero-bases to wire register 19 (40020 - 40001).
    server.set_holding_register(19, 1).await;

    let gw = gateway();
    gw.register_device(device(server.port())).unwrap();
    let tag = Tag::new("setpoint", "40020", DataType::UInt16).writable(true);

    let first = gw.read_tags("plc-1", &[tag.clone()]).await.unwrap();
    assert_eq!(first["setpoint"].raw, RawValue::U16(1));

    // Change the device's memory directly, bypassing the gateway — the
    // cached entry should still win on the next read.
    server.set_holding_register(19, 999).await;
    let still_cached = gw.read_tags("plc-1", &[tag.clone()]).await.unwrap();
    assert_eq!(still_cached["setpoint"].raw, RawValue::U16(1));

    gw.write_tag("plc-1", &tag, RawValue::U16(2)).await.unwrap();

    let after_write = gw.read_tags("plc-1", &[tag]).await.unwrap();
    assert_eq!(after_write["setpoint"].raw, RawValue::U16(2));
}
