use std::time::Duration;

use bytes::Bytes;

use crate::core::NodeIdentity;
use crate::output::Signal;
use crate::time::TimerKind;
use super::message::Message;

/// Input to the protocol driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A frame arrived on the link; `payload` is not yet decoded
    MessageArrived {
        from: NodeIdentity,
        payload: Bytes,
    },
    /// A running timer fired
    TimerFired(TimerKind),
}

impl Event {
    /// Wraps an encoded message as an arrival from `from`
    pub fn message(from: NodeIdentity, message: Message) -> Self {
        Event::MessageArrived {
            from,
            payload: Bytes::from(message.to_bytes()),
        }
    }
}

/// Output of the protocol driver, applied by the host in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send to every node in range
    Broadcast(Message),
    /// Unicast to a registered peer
    Send {
        to: NodeIdentity,
        message: Message,
    },
    /// Register `0` with the link before unicasting to it
    RegisterPeer(NodeIdentity),
    /// Drive one lamp
    SetSignal {
        signal: Signal,
        on: bool,
    },
    /// Start a timer, replacing any running instance of the same kind
    StartTimer {
        kind: TimerKind,
        period: Duration,
        periodic: bool,
    },
    /// Cancel a timer
    StopTimer(TimerKind),
}

impl Effect {
    /// The message this effect puts on the link, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            Effect::Broadcast(message) | Effect::Send { message, .. } => Some(message),
            _ => None,
        }
    }
}
