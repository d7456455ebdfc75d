//! The device registry and its serialized upsert path.
//!
//! The registry holds at most one actor handle per target id. All inserts
//! and updates flow through a single upsert loop owned by the coordinator,
//! which is what keeps two concurrently decoded StateService packets for the
//! same brand-new id from racing into two actors. Reads (dispatch lookups,
//! snapshots) go straight to the shared map.
//!
//! Entries are never evicted: a light that goes offline stays listed with
//! its last known host and port until a future StateService overwrites them
//! or the session ends.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::{Device, DeviceHandle};
use crate::handlers::HandlerBus;
use crate::protocol::TargetId;

/// Shared view of the registry. Written only by the upsert loop.
pub(crate) type SharedRegistry = Arc<RwLock<HashMap<TargetId, DeviceHandle>>>;

/// One discovery observation to fold into the registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Upsert {
    pub target: TargetId,
    pub host: IpAddr,
    pub port: u16,
}

/// Spawn the serialized upsert loop. Returns the sender the dispatcher uses.
pub(crate) fn spawn_upsert_loop(
    registry: SharedRegistry,
    bus: HandlerBus,
    cancel: CancellationToken,
) -> mpsc::UnboundedSender<Upsert> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(upsert_loop(registry, bus, rx, cancel));
    tx
}

async fn upsert_loop(
    registry: SharedRegistry,
    bus: HandlerBus,
    mut rx: mpsc::UnboundedReceiver<Upsert>,
    cancel: CancellationToken,
) {
    debug!("registry upsert loop started");
    loop {
        let upsert = tokio::select! {
            _ = cancel.cancelled() => break,
            upsert = rx.recv() => match upsert {
                Some(upsert) => upsert,
                None => break,
            },
        };

        let mut map = registry.write().await;
        match map.get(&upsert.target) {
            Some(handle) => {
                // Idempotent refresh: same id, host/port updated in place.
                handle.refresh(upsert.host, upsert.port);
            }
            None => {
                info!(target = %upsert.target, host = %upsert.host, port = upsert.port,
                    "discovered new device");
                let device = Device::new(upsert.target, upsert.host, upsert.port);
                let handle = DeviceHandle::spawn(device, bus.clone(), cancel.child_token());
                map.insert(upsert.target, handle);
            }
        }
    }
    debug!("registry upsert loop stopped");
}

/// Snapshot every known device.
pub(crate) async fn snapshot_all(registry: &SharedRegistry) -> Vec<Device> {
    registry.read().await.values().map(DeviceHandle::snapshot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn upsert(port: u16) -> Upsert {
        Upsert {
            target: TargetId([1, 2, 3, 4, 5, 6, 7, 8]),
            host: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
            port,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_target() {
        let cancel = CancellationToken::new();
        let registry: SharedRegistry = Arc::new(RwLock::new(HashMap::new()));
        let bus = HandlerBus::new(cancel.clone());
        let tx = spawn_upsert_loop(Arc::clone(&registry), bus, cancel.clone());

        // Replay the same discovery observation, then a refresh with a new
        // port.
        tx.send(upsert(56700)).unwrap();
        tx.send(upsert(56700)).unwrap();
        tx.send(upsert(56701)).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let devices = snapshot_all(&registry).await;
                if devices.len() == 1 && devices[0].port == 56701 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never converged");

        let devices = snapshot_all(&registry).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].target, TargetId([1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(devices[0].host, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)));
        cancel.cancel();
    }

    #[tokio::test]
    async fn distinct_targets_get_distinct_actors() {
        let cancel = CancellationToken::new();
        let registry: SharedRegistry = Arc::new(RwLock::new(HashMap::new()));
        let bus = HandlerBus::new(cancel.clone());
        let tx = spawn_upsert_loop(Arc::clone(&registry), bus, cancel.clone());

        for i in 0..4u8 {
            tx.send(Upsert {
                target: TargetId([i; 8]),
                host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)),
                port: 56700,
            })
            .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.read().await.len() != 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never converged");
        cancel.cancel();
    }
}
