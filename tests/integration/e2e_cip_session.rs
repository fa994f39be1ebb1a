//! A read and a write through `Gateway` against a mock EtherNet/IP + CIP
//! device, exercising the RegisterSession handshake carried by the pooled
//! connection's `CipSessionDriver`.

use gw_core::{Gateway, HandlerRegistry, ObjectAddressedHandler, RetryPolicy};
use gw_protocol::{DataType, Device, ProtocolKind, RawValue, Tag};
use gw_test_utils::MockCipServer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn gateway() -> Gateway {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(ObjectAddressedHandler::new(
        100,
        Duration::from_secs(60),
        RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(50)),
    )));
    Gateway::new(registry)
}

fn device(port: u16) -> Device {
    Device {
        id: "drive-1".to_string(),
        protocol: ProtocolKind::ObjectAddressed,
        address: "127.0.0.1".to_string(),
        port,
        config: HashMap::new(),
    }
}

#[tokio::test]
async fn reads_a_tag_through_a_negotiated_session() {
    let server = MockCipServer::start().await.unwrap();
    server.set_tag_f32("FlowRate", 42.5).await;

    let gw = gateway();
    gw.register_device(device(server.port())).unwrap();

    let tag = Tag::new("flow", "FlowRate", DataType::Float32);
    let results = gw.read_tags("drive-1", &[tag]).await.unwrap();
    assert_eq!(results["flow"].raw, RawValue::F32(42.5));
}

#[tokio::test]
async fn write_then_read_back_reflects_the_new_value() {
    let server = MockCipServer::start().await.unwrap();
    server.set_tag_u16("Setpoint", 0).await;

    let gw = gateway();
    gw.register_device(device(server.port())).unwrap();

    let tag = Tag::new("setpoint", "Setpoint", DataType::UInt16).writable(true);
    gw.write_tag("drive-1", &tag, RawValue::U16(77)).await.unwrap();

    assert_eq!(
        server.tag_bytes("Setpoint").await,
        Some(77u16.to_le_bytes().to_vec())
    );

    let results = gw.read_tags("drive-1", &[tag]).await.unwrap();
    assert_eq!(results["setpoint"].raw, RawValue::U16(77));
}
