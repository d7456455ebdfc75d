//! End-to-end tests over loopback UDP.
//!
//! These drive a real client session: a test socket plays the part of a
//! light, answering on 127.0.0.1, and the assertions observe the registry
//! and the packets the client sends back.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use glowlink::protocol::{Hsbk, Message, Packet, SetColor, StateService};
use glowlink::{Client, Device, DeviceHandler, Glowlink, TargetId};
use tokio::net::UdpSocket;

const TARGET: TargetId = TargetId([1, 2, 3, 4, 5, 6, 7, 8]);
const LIGHT_SOURCE: u32 = 0x0bad_cafe;

/// Send one StateService announcement from `light` to the client's socket.
async fn announce(light: &UdpSocket, client: &Client, port: u32) -> Result<()> {
    let message = Message::StateService(StateService { service: 1, port });
    let packet = Packet::addressed(LIGHT_SOURCE, TARGET, 0, &message);
    let dest = ("127.0.0.1", client.local_addr()?.port());
    light.send_to(&packet.encode(), dest).await?;
    Ok(())
}

async fn wait_for_devices(
    client: &Client,
    check: impl Fn(&[Device]) -> bool,
) -> Result<Vec<Device>> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let devices = client.devices().await;
            if check(&devices) {
                return devices;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("registry never reached expected state"))
}

#[tokio::test]
async fn state_service_creates_exactly_one_device() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let light = UdpSocket::bind("127.0.0.1:0").await?;

    announce(&light, &client, 56700).await?;
    let devices = wait_for_devices(&client, |d| !d.is_empty()).await?;

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].target, TARGET);
    assert_eq!(devices[0].host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(devices[0].port, 56700);
    Ok(())
}

#[tokio::test]
async fn reflected_session_source_still_registers() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let light = UdpSocket::bind("127.0.0.1:0").await?;

    // A correlating device reflects the requesting session's source id in
    // its StateService response; it must register like any other response.
    let message = Message::StateService(StateService { service: 1, port: 56700 });
    let packet = Packet::addressed(client.source(), TARGET, 0, &message);
    let dest = ("127.0.0.1", client.local_addr()?.port());
    light.send_to(&packet.encode(), dest).await?;

    let devices = wait_for_devices(&client, |d| !d.is_empty()).await?;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].target, TARGET);
    assert_eq!(devices[0].port, 56700);
    Ok(())
}

#[tokio::test]
async fn replayed_state_service_refreshes_in_place() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let light = UdpSocket::bind("127.0.0.1:0").await?;

    announce(&light, &client, 56700).await?;
    wait_for_devices(&client, |d| d.len() == 1).await?;

    // Same target id announced again with a different port: still one
    // device, port updated.
    announce(&light, &client, 56701).await?;
    announce(&light, &client, 56701).await?;
    let devices = wait_for_devices(&client, |d| d.len() == 1 && d[0].port == 56701).await?;
    assert_eq!(devices[0].target, TARGET);
    Ok(())
}

#[tokio::test]
async fn packet_for_unseen_target_leaves_registry_untouched() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let light = UdpSocket::bind("127.0.0.1:0").await?;

    // A state report for a target id never announced via StateService.
    let message = Message::StatePower(glowlink::protocol::PowerLevel { level: 65535 });
    let packet = Packet::addressed(LIGHT_SOURCE, TargetId([9; 8]), 0, &message);
    let dest = ("127.0.0.1", client.local_addr()?.port());
    light.send_to(&packet.encode(), dest).await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.devices().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn every_outgoing_packet_carries_the_session_source() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let light = UdpSocket::bind("127.0.0.1:0").await?;

    // Announce with the light socket's own port so the client sends back to
    // us.
    let light_port = light.local_addr()?.port();
    announce(&light, &client, u32::from(light_port)).await?;
    let devices = wait_for_devices(&client, |d| !d.is_empty()).await?;

    let set_color = Message::SetColor(SetColor {
        color: Hsbk { hue: 0, saturation: 0, brightness: 65535, kelvin: 3500 },
        duration_ms: 1000,
    });
    client.send_to(&devices[0], &set_color).await?;
    client.send_to(&devices[0], &set_color).await?;

    let mut buf = [0u8; 256];
    let mut received = Vec::new();
    for _ in 0..2 {
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), light.recv_from(&mut buf))
            .await
            .map_err(|_| anyhow::anyhow!("no packet from client"))??;
        received.push(Packet::decode(&buf[..len])?);
    }

    for packet in &received {
        assert_eq!(packet.frame.source, client.source());
        assert!(!packet.frame.tagged);
        assert_eq!(packet.address.target, TARGET);
        // Golden payload: hue, sat, brightness, kelvin, duration, LE.
        assert_eq!(
            packet.payload,
            [0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xac, 0x0d, 0xe8, 0x03, 0x00, 0x00]
        );
    }
    assert_ne!(received[0].address.sequence, received[1].address.sequence);
    Ok(())
}

#[test]
fn discovery_interval_is_part_of_the_public_surface() {
    assert_eq!(glowlink::DISCOVERY_INTERVAL, Duration::from_millis(10_000));
}

struct Counting {
    seen: AtomicUsize,
}

#[async_trait]
impl DeviceHandler for Counting {
    async fn device_updated(&self, _device: Device) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn registered_handler_hears_about_discovery() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let handler = Arc::new(Counting { seen: AtomicUsize::new(0) });
    client.register_handler(handler.clone()).await;

    let light = UdpSocket::bind("127.0.0.1:0").await?;
    announce(&light, &client, 56700).await?;

    tokio::time::timeout(Duration::from_secs(5), async {
        while handler.seen.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("handler never notified"))?;
    Ok(())
}

#[tokio::test]
async fn device_update_stream_yields_snapshots() -> Result<()> {
    use futures::StreamExt;

    let _ = tracing_subscriber::fmt::try_init();
    let client = Glowlink::connect().await?;
    let mut updates = Box::pin(client.device_updates());

    let light = UdpSocket::bind("127.0.0.1:0").await?;
    announce(&light, &client, 56700).await?;

    let device = tokio::time::timeout(Duration::from_secs(5), updates.next())
        .await
        .map_err(|_| anyhow::anyhow!("stream yielded nothing"))?
        .ok_or_else(|| anyhow::anyhow!("stream ended"))?;
    assert_eq!(device.target, TARGET);
    Ok(())
}
