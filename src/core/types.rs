use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result, IDENTITY_LEN};

/// Link-layer address of a node, unique per device.
///
/// Ordering is the big-endian integer ordering of the raw bytes, which is what
/// role election compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdentity(pub [u8; IDENTITY_LEN]);

impl NodeIdentity {
    /// Destination used for discovery broadcasts
    pub const BROADCAST: NodeIdentity = NodeIdentity([0xff; IDENTITY_LEN]);

    /// Creates an identity from raw address bytes
    pub const fn new(bytes: [u8; IDENTITY_LEN]) -> Self {
        NodeIdentity(bytes)
    }

    /// Generates a random locally administered unicast address
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; IDENTITY_LEN];
        rng.fill(&mut bytes);
        bytes[0] = (bytes[0] | 0x02) & 0xfe;
        NodeIdentity(bytes)
    }

    /// Reads an identity from the first six bytes of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; IDENTITY_LEN] = bytes.get(..IDENTITY_LEN)?.try_into().ok()?;
        Some(NodeIdentity(raw))
    }

    /// Returns the raw address bytes
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// All-zero address, used on the wire for "no address"
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0u8; IDENTITY_LEN]
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for NodeIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; IDENTITY_LEN];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::config(format!("identity '{s}' has fewer than 6 octets")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| Error::config(format!("invalid octet '{part}' in '{s}': {e}")))?;
        }
        if parts.next().is_some() {
            return Err(Error::config(format!("identity '{s}' has more than 6 octets")));
        }
        Ok(NodeIdentity(bytes))
    }
}

/// Role a node plays while roles are determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Drives the light cycle and initiates handoff
    Master,
    /// Holds STOP and waits for handoff
    Slave,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Role::Master => Role::Slave,
            Role::Slave => Role::Master,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visible phase of the light cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Stop,
    CautionToGo,
    Go,
    /// Change sent, waiting for the peer's Ack. Outputs already show STOP.
    GoToStop,
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Stop => "stop",
            LightState::CautionToGo => "caution-to-go",
            LightState::Go => "go",
            LightState::GoToStop => "go-to-stop",
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and behaviour of the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Period of outgoing heartbeats while roles are determined
    #[serde(with = "super::serde::millis")]
    pub heartbeat_interval: Duration,
    /// Peer silence after which the node resets to undetermined
    #[serde(with = "super::serde::millis")]
    pub heartbeat_timeout: Duration,
    /// CAUTION toggle period while undetermined
    #[serde(with = "super::serde::millis")]
    pub blink_period: Duration,
    /// Hello re-broadcast period while undetermined
    #[serde(with = "super::serde::millis")]
    pub hello_interval: Duration,
    /// Time a new master holds STOP before the caution phase
    #[serde(with = "super::serde::millis")]
    pub stop_hold: Duration,
    /// Length of the combined STOP+CAUTION phase
    #[serde(with = "super::serde::millis")]
    pub caution_hold: Duration,
    /// Shortest GO phase (inclusive)
    #[serde(with = "super::serde::millis")]
    pub go_min: Duration,
    /// Longest GO phase (exclusive)
    #[serde(with = "super::serde::millis")]
    pub go_max: Duration,
    /// Fixed seed for the GO duration generator; entropy when absent
    pub rng_seed: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            heartbeat_interval: Duration::from_millis(super::DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(super::DEFAULT_HEARTBEAT_TIMEOUT_MS),
            blink_period: Duration::from_millis(super::DEFAULT_BLINK_PERIOD_MS),
            hello_interval: Duration::from_millis(super::DEFAULT_HELLO_INTERVAL_MS),
            stop_hold: Duration::from_millis(1000),
            caution_hold: Duration::from_millis(1000),
            go_min: Duration::from_millis(5000),
            go_max: Duration::from_millis(10000),
            rng_seed: None,
        }
    }
}

impl ProtocolConfig {
    /// Checks that the timing is self-consistent
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("blink_period", self.blink_period),
            ("hello_interval", self.hello_interval),
            ("stop_hold", self.stop_hold),
            ("caution_hold", self.caution_hold),
            ("go_min", self.go_min),
        ];
        // Timers run on whole milliseconds.
        for (name, period) in periods {
            if period.as_millis() == 0 {
                return Err(Error::config(format!("{name} must be at least 1ms, got {period:?}")));
            }
        }

        // One lost heartbeat must not be enough to trip the timeout.
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(Error::config(format!(
                "heartbeat_timeout ({:?}) must exceed heartbeat_interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            )));
        }

        if self.go_min.as_millis() >= self.go_max.as_millis() {
            return Err(Error::config(format!(
                "go_min ({:?}) must be shorter than go_max ({:?})",
                self.go_min, self.go_max
            )));
        }

        Ok(())
    }
}
