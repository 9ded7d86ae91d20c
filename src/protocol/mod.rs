//! Protocol implementation module
//!
//! This module defines the wire messages exchanged by the two nodes, their
//! encoding and decoding, role election, and the protocol state machine that
//! turns incoming events into effects.

pub mod codec;
pub mod driver;
pub mod election;
pub mod event;
pub mod message;
pub mod state;

#[cfg(test)]
mod sim;

pub use self::codec::MessageCodec;
pub use self::driver::ProtocolDriver;
pub use self::election::elect;
pub use self::event::{Effect, Event};
pub use self::message::{Message, CHANGE_FLAG};
pub use self::state::{NodeState, ProtocolState, StateInfo, Transition};

/// Largest frame the protocol sends or accepts
pub const MAX_MESSAGE_SIZE: usize = 64;

/// Default UDP port for the host link
pub const DEFAULT_PORT: u16 = 47800;
