//! A two-tag contiguous batch where one tag's wire address always fails:
//! the merged batch read fails, the handler falls back to one read per
//! tag, and the surviving tag still comes back `Quality::Good` while the
//! failing one comes back `Quality::Bad` rather than aborting the whole
//! request.

use gw_core::{Gateway, HandlerRegistry, RegisterAddressedHandler, RetryPolicy};
use gw_protocol::{DataType, Device, ProtocolKind, Quality, RawValue, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves function-code-3 reads out of a fixed register(0) = 100, and
/// silently drops the connection on any request whose address range
/// touches register 1 — deterministically failing only the tag addressed
/// there.
async fn spawn_partially_broken_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                loop {
                    let mut header = [0u8; 7];
                    if sock.read_exact(&mut header).await.is_err() {
                        return;
                    }
                    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
                    let mut pdu = vec![0u8; length.saturating_sub(1)];
                    if sock.read_exact(&mut pdu).await.is_err() {
                        return;
                    }
                    let transaction_id = u16::from_be_bytes([header[0], header[1]]);
                    let unit_id = header[6];
                    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
                    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);

                    if address <= 1 && address + quantity > 1 {
                        // Drop the connection instead of answering.
                        return;
                    }

                    let mut body = vec![0u16; quantity as usize];
                    for (i, v) in body.iter_mut().enumerate() {
                        *v = if address as usize + i == 0 { 100 } else { 0 };
                    }
                    let mut reply_pdu = vec![0x03, (quantity * 2) as u8];
                    for v in &body {
                        reply_pdu.extend_from_slice(&v.to_be_bytes());
                    }
                    let mut reply = transaction_id.to_be_bytes().to_vec();
                    reply.extend_from_slice(&0u16.to_be_bytes());
                    reply.extend_from_slice(&((reply_pdu.len() + 1) as u16).to_be_bytes());
                    reply.push(unit_id);
                    reply.extend_from_slice(&reply_pdu);
                    if sock.write_all(&reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr.port()
}

fn gateway() -> Gateway {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RegisterAddressedHandler::new(
        100,
        Duration::from_secs(60),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
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
async fn one_failing_tag_does_not_take_down_the_rest_of_the_batch() {
    let port = spawn_partially_broken_server().await;
    let gw = gateway();
    gw.register_device(device(port)).unwrap();

    let tags = vec![
        Tag::new("good", "40001", DataType::UInt16),
        Tag::new("bad", "40002", DataType::UInt16),
    ];
    let results = gw.read_tags("plc-1", &tags).await.unwrap();

    assert_eq!(results["good"].raw, RawValue::U16(100));
    assert_eq!(results["good"].quality, Quality::Good);
    assert_eq!(results["bad"].quality, Quality::Bad);
}
