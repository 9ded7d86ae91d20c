//! Role-scoped controllers driven by the protocol driver
//!
//! Each controller is a set of functions over a [`Transition`](crate::protocol::Transition):
//!
//! - [`indicator`]: blinking CAUTION and Hello broadcasts while undetermined
//! - [`liveness`]: heartbeats, the dead-man timer and the hard reset
//! - [`cycle`]: the master's STOP/CAUTION/GO cycle and the Change/Ack handoff

pub mod cycle;
pub mod indicator;
pub mod liveness;
