//! Periodic broadcast discovery.
//!
//! Two states: idle until [`DiscoveryEngine::start`], then discovering until
//! the session shuts down. Discovering broadcasts one GetService packet
//! immediately and then one every 10 seconds, forever. There is no backoff
//! and no retry cap: rediscovery both finds new devices and refreshes the
//! reachability of known ones.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{DEFAULT_PORT, Packet};
use crate::socket::SocketManager;

/// Fixed rediscovery interval.
pub const DISCOVERY_INTERVAL: Duration = Duration::from_millis(10_000);

/// Outbound datagram sink. The seam that lets discovery run against a real
/// socket in production and a recorder in tests.
#[async_trait]
pub(crate) trait Outbound: Send + Sync + 'static {
    async fn send(&self, host: IpAddr, port: u16, bytes: &[u8]) -> Result<()>;
}

#[async_trait]
impl Outbound for SocketManager {
    async fn send(&self, host: IpAddr, port: u16, bytes: &[u8]) -> Result<()> {
        SocketManager::send(self, host, port, bytes).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryState {
    Idle,
    /// Terminal until process stop.
    Discovering,
}

/// Drives the periodic GetService broadcast.
pub struct DiscoveryEngine {
    outbound: Arc<dyn Outbound>,
    source: u32,
    destination: (IpAddr, u16),
    cancel: CancellationToken,
    state: DiscoveryState,
}

impl DiscoveryEngine {
    pub(crate) fn new(outbound: Arc<dyn Outbound>, source: u32, cancel: CancellationToken) -> Self {
        DiscoveryEngine {
            outbound,
            source,
            destination: (IpAddr::V4(Ipv4Addr::BROADCAST), DEFAULT_PORT),
            cancel,
            state: DiscoveryState::Idle,
        }
    }

    /// Override the broadcast destination. Used by tests; production always
    /// targets 255.255.255.255:56700.
    #[cfg(test)]
    fn with_destination(mut self, host: IpAddr, port: u16) -> Self {
        self.destination = (host, port);
        self
    }

    /// Transition idle to discovering and spawn the broadcast loop.
    ///
    /// Idempotent: calling start on an already-discovering engine is a no-op.
    pub fn start(&mut self) {
        if self.state == DiscoveryState::Discovering {
            debug!("discovery already running");
            return;
        }
        self.state = DiscoveryState::Discovering;
        info!(interval_ms = DISCOVERY_INTERVAL.as_millis() as u64, "discovery started");

        let outbound = Arc::clone(&self.outbound);
        let source = self.source;
        let destination = self.destination;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(DISCOVERY_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("discovery loop cancelled");
                        break;
                    }
                    // First tick fires immediately, giving the t=0 broadcast.
                    _ = ticker.tick() => {
                        if let Err(e) = broadcast_once(outbound.as_ref(), source, destination).await {
                            warn!(error = %e, "discovery broadcast failed");
                        }
                    }
                }
            }
        });
    }

    /// Trigger one immediate broadcast outside the timer cadence.
    pub async fn broadcast_once(&self) -> Result<()> {
        broadcast_once(self.outbound.as_ref(), self.source, self.destination).await
    }
}

async fn broadcast_once(outbound: &dyn Outbound, source: u32, dest: (IpAddr, u16)) -> Result<()> {
    let packet = Packet::get_service(source);
    outbound.send(dest.0, dest.1, &packet.encode()).await
}
