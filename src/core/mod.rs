//! Core types and traits for the traffic-light protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{DecodeError, Error, Result};
pub use self::types::{
    LightState,
    NodeIdentity,
    ProtocolConfig,
    Role,
};

/// Length of a link address in bytes
pub const IDENTITY_LEN: usize = 6;

/// Reference heartbeat send period
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2000;

/// Reference dead-man timeout, strictly above the send period
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 3000;

/// Reference CAUTION blink period while undetermined
pub const DEFAULT_BLINK_PERIOD_MS: u64 = 500;

/// Reference Hello re-broadcast period while undetermined
pub const DEFAULT_HELLO_INTERVAL_MS: u64 = 1000;
