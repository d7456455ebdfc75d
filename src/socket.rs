//! UDP socket ownership and the inbound datagram stream.
//!
//! One socket serves the whole session: broadcast-enabled, bound to the
//! wildcard address on an ephemeral port. A reader task owns the receive
//! path and forwards every datagram on an unbounded channel so slow
//! consumers never stall the socket. Sending goes through [`SocketManager::send`]
//! and fails with [`LightError::Closed`] once the session is shut down.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::{LightError, Result};

/// Largest datagram the reader will accept. Protocol payloads are far
/// smaller; anything bigger is not ours.
const MAX_DATAGRAM: usize = 1024;

/// One received datagram with its origin address.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub source: IpAddr,
    pub bytes: Vec<u8>,
}

/// Owner of the session's single UDP endpoint.
///
/// Cheap to clone; all clones share the socket and the shutdown token.
#[derive(Clone)]
pub struct SocketManager {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
}

impl SocketManager {
    /// Bind the session socket and spawn its reader task.
    ///
    /// Returns the manager plus the inbound datagram stream. Datagrams are
    /// delivered in receipt order; the stream ends when the token fires.
    pub async fn bind(
        cancel: CancellationToken,
    ) -> Result<(SocketManager, mpsc::UnboundedReceiver<Datagram>)> {
        // Ephemeral-port bind: SO_REUSEADDR would have no effect here, so it
        // is not set.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| LightError::socket("bind", e))?;
        socket.set_broadcast(true).map_err(|e| LightError::socket("set_broadcast", e))?;
        let socket = Arc::new(socket);

        if let Ok(addr) = socket.local_addr() {
            info!(%addr, "session socket bound");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(reader_task(Arc::clone(&socket), tx, cancel.clone()));

        Ok((SocketManager { socket, cancel }, rx))
    }

    /// Send one datagram. Fire-and-forget at the protocol level; only
    /// resource failures surface here.
    pub async fn send(&self, host: IpAddr, port: u16, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LightError::Closed);
        }
        let dest = SocketAddr::new(host, port);
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(|e| LightError::socket(format!("send to {dest}"), e))?;
        trace!(%dest, len = bytes.len(), "datagram sent");
        Ok(())
    }

    /// Local address of the session socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| LightError::socket("local_addr", e))
    }

    /// Cancel the reader and fail all future sends.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Reader task: blocks on datagram arrival, forwards each one untouched.
///
/// Transient receive errors are tolerated up to a limit, mirroring how the
/// send path treats socket errors as retryable.
async fn reader_task(
    socket: Arc<UdpSocket>,
    tx: mpsc::UnboundedSender<Datagram>,
    cancel: CancellationToken,
) {
    debug!("socket reader started");
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut error_count = 0u32;
    const MAX_ERRORS: u32 = 10;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("socket reader cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => result,
        };

        match result {
            Ok((len, addr)) => {
                error_count = 0;
                trace!(source = %addr, len, "datagram received");
                let datagram = Datagram { source: addr.ip(), bytes: buf[..len].to_vec() };
                if tx.send(datagram).is_err() {
                    debug!("inbound receiver dropped, reader shutting down");
                    break;
                }
            }
            Err(e) => {
                error_count += 1;
                error!("socket receive error ({}/{}): {}", error_count, MAX_ERRORS, e);
                if error_count >= MAX_ERRORS {
                    error!("too many receive errors, reader shutting down");
                    break;
                }
            }
        }
    }
}
