//! Async Rust client for LAN smart-light discovery and control.
//!
//! Glowlink speaks a proprietary UDP control protocol: it discovers lights
//! broadcasting on the local network, maintains a live registry of them and
//! routes binary packets between the network and per-device state holders.
//!
//! # Features
//!
//! - **Discovery**: periodic broadcast enumeration of reachable lights
//! - **Bit-exact codec**: the full three-section binary frame format
//! - **Actor-per-device**: serial, lock-free per-device state updates
//! - **Crash-isolated fan-out**: subscriber failures never touch the core
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use glowlink::Glowlink;
//!
//! #[tokio::main]
//! async fn main() -> glowlink::Result<()> {
//!     let client = Glowlink::connect().await?;
//!
//!     // Discovery runs every 10 seconds; poke it once right now.
//!     client.discover().await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     for device in client.devices().await {
//!         println!("{} at {}:{}", device.target, device.host, device.port);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The wire transport is UDP: unreliable and unordered by design. Sends are
//! fire-and-forget, decode failures are dropped silently, and only
//! resource-level failures (socket open/send) surface as errors.

mod client;
mod device;
mod discovery;
mod dispatcher;
mod error;
mod handlers;
pub mod protocol;
mod registry;
mod socket;

pub use client::Client;
pub use device::Device;
pub use discovery::DISCOVERY_INTERVAL;
pub use error::{FramingError, LightError, Result};
pub use handlers::DeviceHandler;
pub use protocol::{Hsbk, Message, MessageType, Packet, TargetId};
pub use socket::{Datagram, SocketManager};

/// Unified entry point for client sessions.
///
/// # Example
///
/// ```rust,no_run
/// use glowlink::Glowlink;
///
/// #[tokio::main]
/// async fn main() -> glowlink::Result<()> {
///     let client = Glowlink::connect().await?;
///     // Use client...
///     Ok(())
/// }
/// ```
pub struct Glowlink;

impl Glowlink {
    /// Open a client session: bind the broadcast socket, generate the
    /// session source id and start periodic discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the UDP socket cannot be bound or configured for
    /// broadcast.
    pub async fn connect() -> Result<Client> {
        Client::connect().await
    }
}
