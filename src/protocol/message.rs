use std::fmt;

use crate::core::{DecodeError, NodeIdentity, IDENTITY_LEN};

/// Wire tag of a Hello frame
pub const TAG_HELLO: u8 = 0x01;
/// Wire tag of an Ack frame
pub const TAG_ACK: u8 = 0x02;
/// Wire tag of a Change frame
pub const TAG_CHANGE: u8 = 0x03;
/// Wire tag of a Heartbeat frame
pub const TAG_HEARTBEAT: u8 = 0x04;

/// Flag of the first Change a node sends. Later Changes count up from here,
/// wrapping past 255 back to 1, so a replayed Change can be told apart.
pub const CHANGE_FLAG: u8 = 1;

const ADDRESSED_LEN: usize = 1 + IDENTITY_LEN;
const CHANGE_LEN: usize = 2;
const CHANGE_ACK_LEN: usize = 2;

/// Protocol messages exchanged between the two nodes.
///
/// Every frame is a one-byte tag followed by a fixed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Discovery broadcast while undetermined
    Hello {
        /// Sender's address
        address: NodeIdentity,
    },

    /// Reply to Hello (addressed) or acknowledgement of a Change (empty)
    Ack {
        /// Sender's address, absent on a Change acknowledgement
        address: Option<NodeIdentity>,
    },

    /// Master ceding control to the peer
    Change {
        /// Sequence flag of this handoff
        flag: u8,
    },

    /// Acknowledgement of the Change carrying `flag`. Sent with the Ack tag.
    ChangeAck {
        flag: u8,
    },

    /// Periodic liveness signal
    Heartbeat {
        /// Sender's address
        address: NodeIdentity,
    },
}

impl Message {
    /// Tag byte this message is written with
    pub fn tag(&self) -> u8 {
        match self {
            Message::Hello { .. } => TAG_HELLO,
            Message::Ack { .. } | Message::ChangeAck { .. } => TAG_ACK,
            Message::Change { .. } => TAG_CHANGE,
            Message::Heartbeat { .. } => TAG_HEARTBEAT,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::Ack { .. } => "ack",
            Message::ChangeAck { .. } => "change-ack",
            Message::Change { .. } => "change",
            Message::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Address carried in the payload, if this kind carries one
    pub fn address(&self) -> Option<NodeIdentity> {
        match self {
            Message::Hello { address } | Message::Heartbeat { address } => Some(*address),
            Message::Ack { address } => *address,
            Message::Change { .. } | Message::ChangeAck { .. } => None,
        }
    }

    /// Number of bytes `encode_into` writes
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::Ack { address: None } => 1,
            Message::Change { .. } => CHANGE_LEN,
            Message::ChangeAck { .. } => CHANGE_ACK_LEN,
            _ => ADDRESSED_LEN,
        }
    }

    /// Appends the wire form of this message to `dst`
    pub fn encode_into(&self, dst: &mut Vec<u8>) {
        dst.push(self.tag());
        match self {
            Message::Hello { address } | Message::Heartbeat { address } => {
                dst.extend_from_slice(address.as_bytes());
            }
            Message::Ack { address: Some(address) } => {
                dst.extend_from_slice(address.as_bytes());
            }
            Message::Ack { address: None } => {}
            Message::Change { flag } | Message::ChangeAck { flag } => dst.push(*flag),
        }
    }

    /// Returns the wire form of this message
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Parses one frame. Bytes past the fixed layout are ignored.
    pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
        let (&tag, payload) = frame.split_first().ok_or(DecodeError::Empty)?;
        match tag {
            TAG_HELLO => Ok(Message::Hello {
                address: addressed("hello", frame)?,
            }),
            TAG_HEARTBEAT => Ok(Message::Heartbeat {
                address: addressed("heartbeat", frame)?,
            }),
            TAG_ACK if payload.is_empty() => Ok(Message::Ack { address: None }),
            TAG_ACK if payload.len() < IDENTITY_LEN => Ok(Message::ChangeAck { flag: payload[0] }),
            TAG_ACK => {
                // Firmware peers zero-fill the address of a Change acknowledgement.
                let address = addressed("ack", frame)?;
                Ok(Message::Ack {
                    address: (!address.is_unspecified()).then_some(address),
                })
            }
            TAG_CHANGE => {
                let flag = *payload.first().ok_or(DecodeError::Truncated {
                    kind: "change",
                    expected: CHANGE_LEN,
                    actual: frame.len(),
                })?;
                Ok(Message::Change { flag })
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

fn addressed(kind: &'static str, frame: &[u8]) -> Result<NodeIdentity, DecodeError> {
    NodeIdentity::from_slice(&frame[1..]).ok_or(DecodeError::Truncated {
        kind,
        expected: ADDRESSED_LEN,
        actual: frame.len(),
    })
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => write!(f, "{}({})", self.kind(), address),
            None => f.write_str(self.kind()),
        }
    }
}
