//! Device snapshots and the per-device actor.
//!
//! Each discovered light is an independently scheduled state holder, not a
//! passive record. The actor owns its color/power/label state and applies
//! inbound packets strictly serially through a private inbox, so no lock
//! guards per-device state. Snapshots are published on a watch channel and
//! every accepted change is fanned out through the handler bus.

use std::net::IpAddr;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::handlers::HandlerBus;
use crate::protocol::{Hsbk, LightState, MessageType, Packet, PowerLevel, TargetId};

/// Snapshot of one discovered light.
///
/// `host` and `port` come from discovery; the protocol state fields start
/// empty and fill in as the device reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub target: TargetId,
    pub host: IpAddr,
    pub port: u16,
    pub color: Option<Hsbk>,
    pub power: Option<u16>,
    pub label: Option<String>,
}

impl Device {
    pub(crate) fn new(target: TargetId, host: IpAddr, port: u16) -> Self {
        Device { target, host, port, color: None, power: None, label: None }
    }
}

enum DeviceMsg {
    /// Discovery saw this device again; refresh its reachability.
    Refresh { host: IpAddr, port: u16 },
    /// An addressed packet to fold into protocol state.
    Apply(Packet),
}

/// Handle to a running device actor.
#[derive(Clone)]
pub(crate) struct DeviceHandle {
    tx: mpsc::UnboundedSender<DeviceMsg>,
    state: watch::Receiver<Device>,
}

impl DeviceHandle {
    /// Spawn the actor for a newly discovered device and notify the bus of
    /// its creation.
    pub(crate) fn spawn(device: Device, bus: HandlerBus, cancel: CancellationToken) -> DeviceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(device.clone());
        tokio::spawn(actor_task(device, rx, state_tx, bus, cancel));
        DeviceHandle { tx, state: state_rx }
    }

    pub(crate) fn refresh(&self, host: IpAddr, port: u16) {
        let _ = self.tx.send(DeviceMsg::Refresh { host, port });
    }

    pub(crate) fn apply(&self, packet: Packet) {
        let _ = self.tx.send(DeviceMsg::Apply(packet));
    }

    pub(crate) fn snapshot(&self) -> Device {
        self.state.borrow().clone()
    }
}

/// The actor loop: one message processed fully before the next.
async fn actor_task(
    mut device: Device,
    mut rx: mpsc::UnboundedReceiver<DeviceMsg>,
    state_tx: watch::Sender<Device>,
    bus: HandlerBus,
    cancel: CancellationToken,
) {
    debug!(target = %device.target, host = %device.host, "device actor started");
    bus.notify(device.clone()).await;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let changed = match msg {
            DeviceMsg::Refresh { host, port } => {
                let changed = device.host != host || device.port != port;
                device.host = host;
                device.port = port;
                changed
            }
            DeviceMsg::Apply(packet) => apply_packet(&mut device, &packet),
        };

        if changed {
            trace!(target = %device.target, "device state updated");
            let _ = state_tx.send(device.clone());
            bus.notify(device.clone()).await;
        }
    }
    debug!(target = %device.target, "device actor stopped");
}

/// Merge one addressed packet into device state. Returns whether anything
/// changed.
fn apply_packet(device: &mut Device, packet: &Packet) -> bool {
    match packet.message_type() {
        MessageType::StatePower => match PowerLevel::decode(&packet.payload) {
            Ok(payload) => {
                let changed = device.power != Some(payload.level);
                device.power = Some(payload.level);
                changed
            }
            Err(e) => {
                warn!(target = %device.target, error = %e, "bad StatePower payload");
                false
            }
        },
        MessageType::StateLabel => match crate::protocol::Label::decode(&packet.payload) {
            Ok(label) => {
                let changed = device.label.as_deref() != Some(label.0.as_str());
                device.label = Some(label.0);
                changed
            }
            Err(e) => {
                warn!(target = %device.target, error = %e, "bad StateLabel payload");
                false
            }
        },
        MessageType::LightState => match LightState::decode(&packet.payload) {
            Ok(payload) => {
                let changed = device.color != Some(payload.color)
                    || device.power != Some(payload.power)
                    || device.label.as_deref() != Some(payload.label.0.as_str());
                device.color = Some(payload.color);
                device.power = Some(payload.power);
                device.label = Some(payload.label.0);
                changed
            }
            Err(e) => {
                warn!(target = %device.target, error = %e, "bad LightState payload");
                false
            }
        },
        other => {
            trace!(target = %device.target, ?other, "ignoring unhandled message type");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Label, Message};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn test_device() -> Device {
        Device::new(
            TargetId([1, 2, 3, 4, 5, 6, 7, 8]),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
            56700,
        )
    }

    fn addressed(message: &Message) -> Packet {
        Packet::addressed(1, TargetId([1, 2, 3, 4, 5, 6, 7, 8]), 0, message)
    }

    #[test]
    fn light_state_merges_color_power_and_label() {
        let mut device = test_device();
        let state = LightState {
            color: Hsbk { hue: 100, saturation: 200, brightness: 300, kelvin: 3500 },
            power: 65535,
            label: Label("Desk".to_string()),
        };
        let changed = apply_packet(&mut device, &addressed(&Message::LightState(state.clone())));
        assert!(changed);
        assert_eq!(device.color, Some(state.color));
        assert_eq!(device.power, Some(65535));
        assert_eq!(device.label.as_deref(), Some("Desk"));

        // Replaying the identical state is not a change.
        assert!(!apply_packet(&mut device, &addressed(&Message::LightState(state))));
    }

    #[test]
    fn state_power_only_touches_power() {
        let mut device = test_device();
        let changed =
            apply_packet(&mut device, &addressed(&Message::StatePower(PowerLevel { level: 1 })));
        assert!(changed);
        assert_eq!(device.power, Some(1));
        assert_eq!(device.color, None);
        assert_eq!(device.label, None);
    }

    #[test]
    fn unhandled_type_changes_nothing() {
        let mut device = test_device();
        let before = device.clone();
        let packet = addressed(&Message::GetPower);
        assert!(!apply_packet(&mut device, &packet));
        assert_eq!(device, before);
    }

    #[tokio::test]
    async fn actor_applies_packets_serially_and_publishes_snapshots() {
        let cancel = CancellationToken::new();
        let bus = HandlerBus::new(cancel.clone());
        let handle = DeviceHandle::spawn(test_device(), bus, cancel.clone());

        handle.apply(addressed(&Message::StatePower(PowerLevel { level: 40000 })));
        handle.apply(addressed(&Message::StateLabel(Label("Lamp".to_string()))));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snap = handle.snapshot();
                if snap.power == Some(40000) && snap.label.as_deref() == Some("Lamp") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("actor never converged");
        cancel.cancel();
    }
}
