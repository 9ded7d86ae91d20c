//! traffic_sync: two-node synchronized traffic-light protocol
//!
//! Two nodes find each other over a broadcast link, elect a Master by
//! comparing link addresses, and then pass control back and forth with a
//! Change/Ack handoff so that at most one of them ever shows GO. Heartbeats
//! keep the pairing alive; silence sends both nodes back to discovery.
//!
//! The protocol itself ([`protocol::ProtocolDriver`]) is a synchronous state
//! machine that maps events to effects. [`runtime::Node`] hosts it on tokio
//! with a link adapter, a light output and timers.

pub mod control;
pub mod core;
pub mod network;
pub mod output;
pub mod protocol;
pub mod runtime;
pub mod time;

// Re-export commonly used items
pub use crate::core::{Error, LightState, NodeIdentity, ProtocolConfig, Result, Role};
pub use crate::network::{LinkAdapter, LinkConfig, MemoryLink, UdpLink};
pub use crate::output::{LightOutput, Signal, TracingLights};
pub use crate::protocol::{Effect, Event, Message, ProtocolDriver};
pub use crate::runtime::{Node, NodeConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
