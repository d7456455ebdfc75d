//! Handler bus: crash-isolated fan-out of device changes.
//!
//! Subscribers implement [`DeviceHandler`] and each get their own delivery
//! task and queue, so one slow or panicking subscriber cannot affect the
//! others or the core. A panic during notification is caught and logged; if
//! a delivery task dies outright, the registration record is used to respawn
//! it on the next broadcast, so the subscriber keeps receiving later events.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::device::Device;

/// Capacity of the lossy event stream backing [`HandlerBus::subscribe`].
/// Lagging stream consumers skip events; registered handlers never do.
const EVENT_STREAM_CAPACITY: usize = 64;

/// Subscriber notified of every accepted device-registry change.
///
/// Implementations should return promptly: delivery is per-subscriber
/// serial, so a blocked handler delays only its own queue, but that queue is
/// unbounded.
#[async_trait]
pub trait DeviceHandler: Send + Sync + 'static {
    async fn device_updated(&self, device: Device);
}

/// One registration: the stored subscriber plus its live delivery queue.
struct Registration {
    handler: Arc<dyn DeviceHandler>,
    tx: mpsc::UnboundedSender<Device>,
}

/// Fan-out point for device change notifications.
#[derive(Clone)]
pub(crate) struct HandlerBus {
    registrations: Arc<RwLock<Vec<Registration>>>,
    events: broadcast::Sender<Device>,
    cancel: CancellationToken,
}

impl HandlerBus {
    pub(crate) fn new(cancel: CancellationToken) -> HandlerBus {
        let (events, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        HandlerBus { registrations: Arc::new(RwLock::new(Vec::new())), events, cancel }
    }

    /// Register a subscriber and spawn its delivery task.
    pub(crate) async fn register(&self, handler: Arc<dyn DeviceHandler>) {
        let tx = spawn_delivery(Arc::clone(&handler), self.cancel.clone());
        self.registrations.write().await.push(Registration { handler, tx });
        debug!("handler registered");
    }

    /// Stream-style subscription for consumers that prefer a Stream over a
    /// trait object. Lossy under lag.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Device> {
        self.events.subscribe()
    }

    /// Broadcast one device change to every live subscriber.
    ///
    /// A registration whose delivery task has died is recreated from its
    /// stored handler before the event is handed over.
    pub(crate) async fn notify(&self, device: Device) {
        let _ = self.events.send(device.clone());

        let mut registrations = self.registrations.write().await;
        for registration in registrations.iter_mut() {
            if registration.tx.send(device.clone()).is_err() {
                warn!("delivery task gone, reinstating handler registration");
                let tx = spawn_delivery(Arc::clone(&registration.handler), self.cancel.clone());
                let _ = tx.send(device.clone());
                registration.tx = tx;
            }
        }
    }
}

/// Spawn a delivery task: serial per subscriber, panic-isolated per event.
fn spawn_delivery(
    handler: Arc<dyn DeviceHandler>,
    cancel: CancellationToken,
) -> mpsc::UnboundedSender<Device> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Device>();
    tokio::spawn(async move {
        loop {
            let device = tokio::select! {
                _ = cancel.cancelled() => break,
                device = rx.recv() => match device {
                    Some(device) => device,
                    None => break,
                },
            };
            let delivery = std::panic::AssertUnwindSafe(handler.device_updated(device));
            if delivery.catch_unwind().await.is_err() {
                warn!("handler panicked during notification; continuing");
            }
        }
    });
    tx
}
