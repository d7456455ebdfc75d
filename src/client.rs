//! The coordinator: session identity, registry ownership and the send path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::Device;
use crate::discovery::DiscoveryEngine;
use crate::dispatcher::{self, DispatchContext};
use crate::error::Result;
use crate::handlers::{DeviceHandler, HandlerBus};
use crate::protocol::{DEFAULT_PORT, Message, Packet, TargetId};
use crate::registry::{self, SharedRegistry};
use crate::socket::SocketManager;

/// A running client session.
///
/// Owns the session source id, the socket, the device registry and all the
/// background tasks wired up by [`Client::connect`]. Dropping the client
/// cancels everything: the discovery timer, the socket reader, the device
/// actors and the handler deliveries.
pub struct Client {
    source: u32,
    sequence: AtomicU8,
    socket: SocketManager,
    registry: SharedRegistry,
    bus: HandlerBus,
    discovery: DiscoveryEngine,
    cancel: CancellationToken,
}

impl Client {
    /// Open the session socket, spawn the processing tasks and start
    /// periodic discovery.
    ///
    /// The session source id is drawn uniformly over the full 32-bit range,
    /// once, and stamped into every outgoing frame for the lifetime of this
    /// client. A restart draws a new id; no protocol state outlives the
    /// process.
    pub async fn connect() -> Result<Client> {
        let source: u32 = rand::random();
        let cancel = CancellationToken::new();

        let (socket, inbound) = SocketManager::bind(cancel.child_token()).await?;

        let registry: SharedRegistry = Arc::new(RwLock::new(HashMap::new()));
        let bus = HandlerBus::new(cancel.child_token());
        let upserts =
            registry::spawn_upsert_loop(Arc::clone(&registry), bus.clone(), cancel.child_token());

        let context = Arc::new(DispatchContext { registry: Arc::clone(&registry), upserts });
        dispatcher::spawn(inbound, context, cancel.child_token());

        let mut discovery =
            DiscoveryEngine::new(Arc::new(socket.clone()), source, cancel.child_token());
        discovery.start();

        info!(source = format_args!("{source:#010x}"), "session established");
        Ok(Client { source, sequence: AtomicU8::new(0), socket, registry, bus, discovery, cancel })
    }

    /// Trigger one immediate discovery broadcast, outside the 10-second
    /// cadence.
    pub async fn discover(&self) -> Result<()> {
        self.discovery.broadcast_once().await
    }

    /// Send an addressed message to one device, stamped with the session
    /// source and the next sequence byte. Fire-and-forget: no response is
    /// awaited.
    pub async fn send_to(&self, device: &Device, message: &Message) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let packet = Packet::addressed(self.source, device.target, sequence, message);
        self.socket.send(device.host, device.port, &packet.encode()).await
    }

    /// Broadcast a tagged message to every device on the network.
    pub async fn broadcast(&self, message: &Message) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut packet = Packet::addressed(self.source, TargetId::BROADCAST, sequence, message);
        packet.frame.tagged = true;
        self.socket
            .send(IpAddr::V4(Ipv4Addr::BROADCAST), DEFAULT_PORT, &packet.encode())
            .await
    }

    /// Snapshot every device currently in the registry.
    pub async fn devices(&self) -> Vec<Device> {
        registry::snapshot_all(&self.registry).await
    }

    /// Register a subscriber for device change notifications.
    pub async fn register_handler(&self, handler: Arc<dyn DeviceHandler>) {
        self.bus.register(handler).await;
    }

    /// Device changes as a stream, for consumers that prefer streams over
    /// the [`DeviceHandler`] trait. Lossy under lag, unlike registered
    /// handlers.
    pub fn device_updates(&self) -> impl Stream<Item = Device> + 'static {
        BroadcastStream::new(self.bus.subscribe()).filter_map(|item| async move { item.ok() })
    }

    /// The session source id stamped into every outgoing frame.
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Local address of the session socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Shut the session down: stop discovery, close the socket, tear down
    /// all actors and handler deliveries.
    pub fn close(&self) {
        info!("closing session");
        self.cancel.cancel();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        debug!("dropping client session");
        self.cancel.cancel();
    }
}
