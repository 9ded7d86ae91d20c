//! Light-cycle controller and the Change/Ack handoff.
//!
//! Only the master runs the cycle. It holds STOP, shows STOP+CAUTION, shows
//! GO for a random time, then sends Change and shows STOP straight away. The
//! role swap itself completes when the peer's Ack arrives. The slave holds
//! STOP until a Change makes it master.
//!
//! Each Change carries a sequence flag and the Ack echoes it back, so a
//! replayed Change is acknowledged without being taken a second time and a
//! stale Ack cannot complete a newer handoff. A pending Change is resent with
//! every heartbeat until its Ack arrives.

use std::time::Duration;

use rand::Rng;

use crate::core::{LightState, NodeIdentity, Role};
use crate::protocol::{Message, NodeState, Transition, CHANGE_FLAG};
use crate::time::TimerKind;

/// Starts the cycle for a freshly elected `role`, showing STOP
pub fn enter(tx: &mut Transition<'_>, role: Role) {
    tx.state.handoff_pending = false;
    tx.state.last_change = None;
    tx.state.node = NodeState::RoleDetermined {
        role,
        light: LightState::Stop,
    };
    tx.set_light(LightState::Stop);

    match role {
        Role::Master => become_master(tx),
        Role::Slave => become_slave(tx),
    }
}

/// Stops the cycle timer when the role is dropped
pub fn leave(tx: &mut Transition<'_>) {
    tx.stop_timer(TimerKind::CyclePhase);
}

/// `CyclePhase` fired: advance the master's light
pub fn on_phase_timer(tx: &mut Transition<'_>) {
    let light = match tx.state.node {
        NodeState::RoleDetermined {
            role: Role::Master,
            light,
        } => light,
        _ => return,
    };

    match light {
        LightState::Stop => {
            tx.set_light(LightState::CautionToGo);
            let hold = tx.config.caution_hold;
            tx.start_timer(TimerKind::CyclePhase, hold, false);
        }
        LightState::CautionToGo => {
            tx.set_light(LightState::Go);
            let green = green_duration(tx);
            tracing::debug!(?green, "Go phase");
            tx.start_timer(TimerKind::CyclePhase, green, false);
        }
        LightState::Go => {
            let flag = next_flag(tx.state.sent_change);
            tx.state.sent_change = flag;
            tx.send_to_peer(Message::Change { flag });
            tx.state.handoff_pending = true;
            tx.set_light(LightState::GoToStop);
        }
        LightState::GoToStop => {}
    }
}

/// Resends the Change of a handoff still waiting for its Ack
pub fn resend_pending(tx: &mut Transition<'_>) {
    if tx.state.handoff_pending {
        let flag = tx.state.sent_change;
        tracing::debug!(flag, "Change still unacknowledged, resending");
        tx.send_to_peer(Message::Change { flag });
    }
}

/// Change carrying `flag` arrived from the peer
pub fn on_change(tx: &mut Transition<'_>, from: NodeIdentity, flag: u8) {
    let (role, light) = match tx.state.node {
        NodeState::RoleDetermined { role, light } => (role, light),
        NodeState::Undetermined => return,
    };

    if !is_newer(flag, tx.state.last_change) {
        tracing::debug!(peer = %from, flag, "Replayed change, acknowledging again");
        tx.send(from, Message::ChangeAck { flag });
        return;
    }

    match role {
        Role::Slave => accept_change(tx, from, flag),
        Role::Master if light == LightState::GoToStop && tx.state.handoff_pending => {
            // Our Change got through but its Ack was lost, and the peer has
            // already finished its own cycle.
            tracing::info!(peer = %from, flag, "Change crossed pending handoff, completing it");
            complete_handoff(tx);
            accept_change(tx, from, flag);
        }
        Role::Master => {
            tracing::debug!(peer = %from, flag, "Change while in control, acknowledging only");
            tx.state.last_change = Some(flag);
            tx.send(from, Message::ChangeAck { flag });
        }
    }
}

/// Ack arrived from the peer. `echo` is the Change flag it carries; a bare
/// Ack carries none and is taken for the pending Change.
pub fn on_ack(tx: &mut Transition<'_>, echo: Option<u8>) {
    let awaiting = matches!(
        tx.state.node,
        NodeState::RoleDetermined {
            role: Role::Master,
            light: LightState::GoToStop,
        }
    ) && tx.state.handoff_pending;
    let current = echo.map_or(true, |flag| flag == tx.state.sent_change);

    if awaiting && current {
        complete_handoff(tx);
        tracing::info!(peer = ?tx.state.peers.address(), "Handed control to peer");
    } else {
        tracing::trace!(?echo, awaiting, "Ignoring ack with no matching handoff in flight");
    }
}

fn accept_change(tx: &mut Transition<'_>, from: NodeIdentity, flag: u8) {
    tx.send(from, Message::ChangeAck { flag });
    tx.state.last_change = Some(flag);
    tx.state.awaiting_change = false;
    tx.state.handoffs += 1;
    tx.state.node = NodeState::RoleDetermined {
        role: Role::Master,
        light: LightState::Stop,
    };
    tx.set_light(LightState::Stop);
    become_master(tx);
    tracing::info!(peer = %from, "Took control from peer");
}

fn complete_handoff(tx: &mut Transition<'_>) {
    tx.state.handoff_pending = false;
    tx.state.handoffs += 1;
    tx.state.node = NodeState::RoleDetermined {
        role: Role::Slave,
        light: LightState::Stop,
    };
    tx.set_light(LightState::Stop);
    become_slave(tx);
}

fn become_master(tx: &mut Transition<'_>) {
    tx.state.awaiting_change = false;
    let hold = tx.config.stop_hold;
    tx.start_timer(TimerKind::CyclePhase, hold, false);
}

fn become_slave(tx: &mut Transition<'_>) {
    tx.state.awaiting_change = true;
    tx.stop_timer(TimerKind::CyclePhase);
}

/// Flag following `previous`, skipping 0 on wrap
fn next_flag(previous: u8) -> u8 {
    match previous.checked_add(1) {
        Some(flag) => flag,
        None => CHANGE_FLAG,
    }
}

/// True if `flag` comes after `last` in the wrapping flag sequence, looking
/// at most half the sequence ahead
fn is_newer(flag: u8, last: Option<u8>) -> bool {
    let Some(last) = last else { return true };
    let span = i16::from(u8::MAX);
    let distance = (i16::from(flag) - i16::from(last)).rem_euclid(span);
    (1..=span / 2).contains(&distance)
}

/// Draws a GO duration, whole milliseconds in `[go_min, go_max)`
fn green_duration(tx: &mut Transition<'_>) -> Duration {
    let min = tx.config.go_min.as_millis() as u64;
    let max = tx.config.go_max.as_millis() as u64;
    Duration::from_millis(tx.rng.gen_range(min..max))
}
