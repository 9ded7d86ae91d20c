//! Link management and peer tracking module
//!
//! This module defines the link adapter the runtime sends frames through,
//! the frames it receives, and the UDP and in-memory link implementations.

mod memory;
mod peer;
mod udp;

pub use self::memory::{DropSwitch, MemoryLink};
pub use self::peer::{PeerInfo, PeerRegistry};
pub use self::udp::UdpLink;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::{NodeIdentity, Result};
use crate::protocol::DEFAULT_PORT;

/// Inbound frame capacity of a link's receive channel
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// A frame received from the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Link address of the sender
    pub from: NodeIdentity,
    /// Raw frame bytes, not yet decoded
    pub payload: Bytes,
}

/// Connectionless frame transport between nodes.
///
/// All operations are non-blocking and fire-and-forget: `Ok` means the frame
/// was handed to the transport, not that anyone received it.
pub trait LinkAdapter {
    /// This node's link address
    fn local(&self) -> NodeIdentity;

    /// Sends `frame` to every node in range
    fn broadcast(&mut self, frame: &[u8]) -> Result<()>;

    /// Unicasts `frame` to a registered peer
    fn send(&mut self, to: &NodeIdentity, frame: &[u8]) -> Result<()>;

    /// Makes `peer` addressable by [`send`](LinkAdapter::send)
    fn register_peer(&mut self, peer: &NodeIdentity) -> Result<()>;
}

/// UDP link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Local address to bind
    pub bind_addr: SocketAddr,
    /// Destinations a broadcast is sent to
    pub broadcast_addrs: Vec<SocketAddr>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            broadcast_addrs: vec![SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::BROADCAST,
                DEFAULT_PORT,
            ))],
        }
    }
}
