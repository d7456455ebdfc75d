//! Inbound packet dispatch.
//!
//! The dispatcher consumes the socket's datagram stream and hands each
//! datagram to its own short-lived task, so a slow decode never stalls the
//! reader and packets from different sources carry no ordering guarantee.
//! StateService packets feed the registry's serialized upsert path; every
//! other type is forwarded to the target's actor if one exists and silently
//! dropped otherwise.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::protocol::{MessageType, Packet, StateService};
use crate::registry::{SharedRegistry, Upsert};
use crate::socket::Datagram;

/// Everything a dispatch worker needs, shared across workers.
pub(crate) struct DispatchContext {
    pub registry: SharedRegistry,
    pub upserts: mpsc::UnboundedSender<Upsert>,
}

/// Spawn the dispatch loop over the inbound datagram stream.
pub(crate) fn spawn(
    mut inbound: mpsc::UnboundedReceiver<Datagram>,
    context: Arc<DispatchContext>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        debug!("dispatcher started");
        loop {
            let datagram = tokio::select! {
                _ = cancel.cancelled() => break,
                datagram = inbound.recv() => match datagram {
                    Some(datagram) => datagram,
                    None => break,
                },
            };
            // One worker per datagram; the reader loop never waits on decode.
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                dispatch(datagram, &context).await;
            });
        }
        debug!("dispatcher stopped");
    });
}

/// Decode one datagram and route it. Failures are logged and dropped; they
/// must never propagate back to the reader.
async fn dispatch(datagram: Datagram, context: &DispatchContext) {
    let packet = match Packet::decode(&datagram.bytes) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(source = %datagram.source, error = %e, "dropping undecodable datagram");
            return;
        }
    };

    // No filtering on the frame source: devices reflect the requesting
    // session's source id in their responses for correlation, so it never
    // identifies the packet's origin. Our own broadcast echoes are harmless
    // here; they fall through to the unknown-target drop.
    match packet.message_type() {
        MessageType::StateService => {
            let payload = match StateService::decode(&packet.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(source = %datagram.source, error = %e, "dropping bad StateService");
                    return;
                }
            };
            if packet.address.target.is_broadcast() {
                debug!(source = %datagram.source, "dropping StateService without a target id");
                return;
            }
            let Ok(port) = u16::try_from(payload.port) else {
                debug!(source = %datagram.source, port = payload.port,
                    "dropping StateService with out-of-range port");
                return;
            };
            let upsert = Upsert { target: packet.address.target, host: datagram.source, port };
            if context.upserts.send(upsert).is_err() {
                trace!("registry gone, dropping upsert");
            }
        }
        _ => {
            let registry = context.registry.read().await;
            match registry.get(&packet.address.target) {
                Some(handle) => handle.apply(packet),
                None => {
                    // Expected race: a device can answer before discovery
                    // finishes registering it.
                    trace!(target = %packet.address.target, "dropping packet for unknown target");
                }
            }
        }
    }
}
