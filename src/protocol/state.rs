use std::time::Duration;

use rand::rngs::StdRng;

use crate::core::{Error, LightState, NodeIdentity, ProtocolConfig, Result, Role};
use crate::network::PeerRegistry;
use crate::output::{pattern, Signal};
use crate::time::{TimerKind, TimerSet};
use super::event::Effect;
use super::message::Message;

/// Top-level protocol state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No peer confirmed; blinking CAUTION and broadcasting Hello
    Undetermined,

    /// Paired with a peer
    RoleDetermined {
        /// Current role
        role: Role,
        /// Visible light phase
        light: LightState,
    },
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Undetermined => "undetermined",
            NodeState::RoleDetermined { .. } => "role-determined",
        }
    }
}

/// Everything the protocol knows about one node.
///
/// Owned by the [`ProtocolDriver`](super::ProtocolDriver); components get a
/// mutable borrow of it for the duration of a single event.
#[derive(Debug, Clone)]
pub struct ProtocolState {
    /// This node's link address
    pub(crate) local: NodeIdentity,
    /// Current top-level state
    pub(crate) node: NodeState,
    /// The one tracked peer
    pub(crate) peers: PeerRegistry,
    /// Master only: a Change is in flight and its Ack has not arrived
    pub(crate) handoff_pending: bool,
    /// Slave only: waiting for the peer's Change
    pub(crate) awaiting_change: bool,
    /// Flag of the last Change this node sent, 0 before the first
    pub(crate) sent_change: u8,
    /// Flag of the last Change accepted from the current peer
    pub(crate) last_change: Option<u8>,
    /// CAUTION lamp phase while undetermined
    pub(crate) caution_on: bool,
    /// Timers this state has started and not stopped
    pub(crate) timers: TimerSet,
    /// Role swaps since startup
    pub(crate) handoffs: u64,
    /// Heartbeat-timeout resets since startup
    pub(crate) resets: u64,
}

/// Summary of the current protocol state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    /// Current state type
    pub state_type: &'static str,
    /// Current role (if determined)
    pub role: Option<Role>,
    /// Current light phase (if determined)
    pub light: Option<LightState>,
    /// Tracked peer
    pub peer: Option<NodeIdentity>,
    pub handoff_pending: bool,
    pub awaiting_change: bool,
    /// Role swaps since startup
    pub handoffs: u64,
    /// Heartbeat-timeout resets since startup
    pub resets: u64,
}

impl ProtocolState {
    /// Creates the initial state for `local`
    pub fn new(local: NodeIdentity) -> Self {
        ProtocolState {
            local,
            node: NodeState::Undetermined,
            peers: PeerRegistry::new(),
            handoff_pending: false,
            awaiting_change: false,
            sent_change: 0,
            last_change: None,
            caution_on: false,
            timers: TimerSet::new(),
            handoffs: 0,
            resets: 0,
        }
    }

    pub fn local(&self) -> NodeIdentity {
        self.local
    }

    pub fn node_state(&self) -> NodeState {
        self.node
    }

    pub fn role(&self) -> Option<Role> {
        match self.node {
            NodeState::RoleDetermined { role, .. } => Some(role),
            NodeState::Undetermined => None,
        }
    }

    pub fn light(&self) -> Option<LightState> {
        match self.node {
            NodeState::RoleDetermined { light, .. } => Some(light),
            NodeState::Undetermined => None,
        }
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn handoff_pending(&self) -> bool {
        self.handoff_pending
    }

    pub fn awaiting_change(&self) -> bool {
        self.awaiting_change
    }

    pub fn active_timers(&self) -> TimerSet {
        self.timers
    }

    pub fn handoffs(&self) -> u64 {
        self.handoffs
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Gets information about the current state
    pub fn info(&self) -> StateInfo {
        StateInfo {
            state_type: self.node.as_str(),
            role: self.role(),
            light: self.light(),
            peer: self.peers.address(),
            handoff_pending: self.handoff_pending,
            awaiting_change: self.awaiting_change,
            handoffs: self.handoffs,
            resets: self.resets,
        }
    }

    /// Checks the timer and flag invariants of a started node
    pub fn check_invariants(&self) -> Result<()> {
        use TimerKind::*;

        let timers = self.timers;
        let expect = |kind: TimerKind, active: bool| -> Result<()> {
            if timers.contains(kind) == active {
                Ok(())
            } else {
                Err(Error::invalid_state(format!(
                    "{kind} should be {} in {:?}",
                    if active { "running" } else { "stopped" },
                    self.node
                )))
            }
        };

        match self.node {
            NodeState::Undetermined => {
                expect(UndeterminedBlink, true)?;
                expect(HelloBroadcast, true)?;
                expect(HeartbeatSend, false)?;
                expect(HeartbeatTimeout, false)?;
                expect(CyclePhase, false)?;
                if self.handoff_pending || self.awaiting_change {
                    return Err(Error::invalid_state("role flags set while undetermined"));
                }
            }
            NodeState::RoleDetermined { role, light } => {
                expect(UndeterminedBlink, false)?;
                expect(HelloBroadcast, false)?;
                expect(HeartbeatSend, true)?;
                expect(HeartbeatTimeout, true)?;
                if self.peers.address().is_none() {
                    return Err(Error::invalid_state("role determined without a peer"));
                }
                match role {
                    Role::Master => {
                        expect(CyclePhase, light != LightState::GoToStop)?;
                        if self.awaiting_change {
                            return Err(Error::invalid_state("master waiting for change"));
                        }
                        if self.handoff_pending != (light == LightState::GoToStop) {
                            return Err(Error::invalid_state(format!(
                                "handoff flag {} in {light}",
                                self.handoff_pending
                            )));
                        }
                    }
                    Role::Slave => {
                        expect(CyclePhase, false)?;
                        if light != LightState::Stop || !self.awaiting_change || self.handoff_pending {
                            return Err(Error::invalid_state(format!(
                                "slave in {light} (waiting: {}, handoff: {})",
                                self.awaiting_change, self.handoff_pending
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Work area for one event: the borrowed state plus the effects produced so far.
///
/// Timer effects also update the state's record of running timers, so the two
/// never drift apart.
pub struct Transition<'a> {
    pub(crate) state: &'a mut ProtocolState,
    pub(crate) config: &'a ProtocolConfig,
    pub(crate) rng: &'a mut StdRng,
    effects: Vec<Effect>,
}

impl<'a> Transition<'a> {
    pub(crate) fn new(
        state: &'a mut ProtocolState,
        config: &'a ProtocolConfig,
        rng: &'a mut StdRng,
    ) -> Self {
        Transition {
            state,
            config,
            rng,
            effects: Vec::new(),
        }
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    pub(crate) fn start_timer(&mut self, kind: TimerKind, period: Duration, periodic: bool) {
        self.state.timers.insert(kind);
        self.effects.push(Effect::StartTimer {
            kind,
            period,
            periodic,
        });
    }

    pub(crate) fn stop_timer(&mut self, kind: TimerKind) {
        if self.state.timers.remove(kind) {
            self.effects.push(Effect::StopTimer(kind));
        }
    }

    pub(crate) fn set_signal(&mut self, signal: Signal, on: bool) {
        self.effects.push(Effect::SetSignal { signal, on });
    }

    /// Records a new light phase and drives the lamps to match it
    pub(crate) fn set_light(&mut self, light: LightState) {
        if let NodeState::RoleDetermined { light: current, role } = &mut self.state.node {
            tracing::debug!(role = %role, from = %current, to = %light, "Light phase");
            *current = light;
        }
        for (signal, on) in pattern(light) {
            self.set_signal(signal, on);
        }
    }

    pub(crate) fn broadcast(&mut self, message: Message) {
        self.effects.push(Effect::Broadcast(message));
    }

    pub(crate) fn send(&mut self, to: NodeIdentity, message: Message) {
        self.effects.push(Effect::Send { to, message });
    }

    /// Unicasts to the tracked peer; a no-op before discovery
    pub(crate) fn send_to_peer(&mut self, message: Message) {
        match self.state.peers.address() {
            Some(peer) => self.send(peer, message),
            None => tracing::debug!(%message, "No peer to send to"),
        }
    }

    pub(crate) fn register_peer(&mut self, peer: NodeIdentity) {
        self.effects.push(Effect::RegisterPeer(peer));
        self.state.peers.mark_registered();
    }
}
