//! Heartbeat emission and the dead-man timer.
//!
//! Recovery is a hard reset: with only two nodes there is nobody to arbitrate
//! a half-finished handoff, so on silence the node drops its role and starts
//! discovery from scratch.

use crate::protocol::{Message, NodeState, Transition};
use crate::time::TimerKind;
use super::{cycle, indicator};

/// Starts both heartbeat timers on entering a role
pub fn arm(tx: &mut Transition<'_>) {
    let interval = tx.config.heartbeat_interval;
    let timeout = tx.config.heartbeat_timeout;
    tx.start_timer(TimerKind::HeartbeatSend, interval, true);
    tx.start_timer(TimerKind::HeartbeatTimeout, timeout, true);
}

/// `HeartbeatSend` fired. A handoff still waiting for its Ack rides along.
pub fn on_send_timer(tx: &mut Transition<'_>) {
    let address = tx.state.local;
    tx.send_to_peer(Message::Heartbeat { address });
    cycle::resend_pending(tx);
}

/// A meaningful message arrived from the peer: restart the dead-man timer
pub fn on_peer_activity(tx: &mut Transition<'_>) {
    if tx.state.timers.contains(TimerKind::HeartbeatTimeout) {
        let timeout = tx.config.heartbeat_timeout;
        tx.start_timer(TimerKind::HeartbeatTimeout, timeout, true);
    }
}

/// `HeartbeatTimeout` fired: the peer has been silent too long
pub fn on_timeout(tx: &mut Transition<'_>) {
    tracing::warn!(
        peer = ?tx.state.peers.address(),
        role = ?tx.state.role(),
        timeout = ?tx.config.heartbeat_timeout,
        "Peer silent, resetting to undetermined"
    );
    reset(tx);
}

/// Drops the role and every role-scoped timer, then restarts discovery
pub fn reset(tx: &mut Transition<'_>) {
    tx.stop_timer(TimerKind::HeartbeatSend);
    tx.stop_timer(TimerKind::HeartbeatTimeout);
    cycle::leave(tx);

    tx.state.handoff_pending = false;
    tx.state.awaiting_change = false;
    tx.state.last_change = None;
    tx.state.node = NodeState::Undetermined;
    tx.state.resets += 1;

    indicator::enter(tx);
}
