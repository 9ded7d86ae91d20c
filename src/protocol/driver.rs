use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::control::{cycle, indicator, liveness};
use crate::core::{LightState, NodeIdentity, ProtocolConfig, Result, Role};
use crate::time::{TimerKind, TimerSet};
use super::election::elect;
use super::event::{Effect, Event};
use super::message::Message;
use super::state::{NodeState, ProtocolState, StateInfo, Transition};

/// Top-level protocol state machine of one node.
///
/// Synchronous and free of I/O: the host feeds it one [`Event`] at a time and
/// performs the returned [`Effect`]s in order. Given the same seed, the same
/// events always produce the same effects.
pub struct ProtocolDriver {
    state: ProtocolState,
    config: ProtocolConfig,
    rng: StdRng,
    started: bool,
}

impl ProtocolDriver {
    /// Creates a driver for the node `local`
    pub fn new(local: NodeIdentity, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(ProtocolDriver {
            state: ProtocolState::new(local),
            config,
            rng,
            started: false,
        })
    }

    /// Enters the initial undetermined state. Later calls return nothing.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.started {
            return Vec::new();
        }
        self.started = true;

        tracing::info!(node = %self.state.local, "Starting discovery");
        let mut tx = Transition::new(&mut self.state, &self.config, &mut self.rng);
        indicator::enter(&mut tx);
        tx.into_effects()
    }

    /// Processes one event, returning the effects to perform
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = self.start();

        let mut tx = Transition::new(&mut self.state, &self.config, &mut self.rng);
        match event {
            Event::MessageArrived { from, payload } => on_frame(&mut tx, from, &payload),
            Event::TimerFired(kind) => on_timer(&mut tx, kind),
        }
        effects.extend(tx.into_effects());

        debug_assert!(
            self.state.check_invariants().is_ok(),
            "{:?}",
            self.state.check_invariants()
        );
        effects
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn local(&self) -> NodeIdentity {
        self.state.local()
    }

    pub fn node_state(&self) -> NodeState {
        self.state.node_state()
    }

    pub fn role(&self) -> Option<Role> {
        self.state.role()
    }

    pub fn light(&self) -> Option<LightState> {
        self.state.light()
    }

    pub fn peer(&self) -> Option<NodeIdentity> {
        self.state.peers().address()
    }

    /// HandoffFlag: a Change is waiting for its Ack
    pub fn handoff_pending(&self) -> bool {
        self.state.handoff_pending()
    }

    /// WaitFlag: the slave is waiting for a Change
    pub fn awaiting_change(&self) -> bool {
        self.state.awaiting_change()
    }

    pub fn active_timers(&self) -> TimerSet {
        self.state.active_timers()
    }

    pub fn handoffs(&self) -> u64 {
        self.state.handoffs()
    }

    pub fn state_info(&self) -> StateInfo {
        self.state.info()
    }
}

fn on_frame(tx: &mut Transition<'_>, from: NodeIdentity, payload: &[u8]) {
    let message = match Message::decode(payload) {
        Ok(message) => message,
        Err(error) => {
            tracing::trace!(%from, %error, "Dropping malformed frame");
            return;
        }
    };

    if from == tx.state.local {
        tracing::trace!(%message, "Ignoring our own frame");
        return;
    }

    match tx.state.node {
        NodeState::Undetermined => match message {
            Message::Hello { .. } => {
                if discover(tx, from) {
                    let address = tx.state.local;
                    tx.send(from, Message::Ack { address: Some(address) });
                }
            }
            Message::Ack { address: Some(_) } => {
                discover(tx, from);
            }
            _ => tracing::trace!(%from, %message, "Ignoring message while undetermined"),
        },
        NodeState::RoleDetermined { .. } => {
            if !tx.state.peers.is_peer(&from) {
                tracing::debug!(%from, %message, "Ignoring message from a node other than our peer");
                return;
            }

            // A Hello from our own peer means it has reset. Not counting it as
            // liveness lets our dead-man timer expire so both sides rediscover.
            if let Message::Hello { .. } = message {
                tracing::debug!(%from, "Peer is rediscovering, ignoring hello while paired");
                return;
            }

            liveness::on_peer_activity(tx);
            match message {
                Message::Change { flag } => cycle::on_change(tx, from, flag),
                Message::ChangeAck { flag } => cycle::on_ack(tx, Some(flag)),
                Message::Ack { address: None } => cycle::on_ack(tx, None),
                // A late reply to our discovery Hello, never a handoff Ack.
                Message::Ack { address: Some(_) } => {
                    tracing::trace!(%from, "Ignoring discovery ack while paired");
                }
                Message::Heartbeat { .. } | Message::Hello { .. } => {}
            }
        }
    }
}

fn on_timer(tx: &mut Transition<'_>, kind: TimerKind) {
    if !tx.state.timers.contains(kind) {
        tracing::trace!(timer = %kind, "Ignoring fire of a stopped timer");
        return;
    }

    match kind {
        TimerKind::HeartbeatSend => liveness::on_send_timer(tx),
        TimerKind::HeartbeatTimeout => liveness::on_timeout(tx),
        TimerKind::UndeterminedBlink => indicator::on_blink(tx),
        TimerKind::HelloBroadcast => indicator::on_hello_timer(tx),
        TimerKind::CyclePhase => {
            tx.state.timers.remove(kind);
            cycle::on_phase_timer(tx);
        }
    }
}

/// Pairs with `peer` and takes the elected role. False if `peer` cannot be
/// paired with.
fn discover(tx: &mut Transition<'_>, peer: NodeIdentity) -> bool {
    let role = match elect(&tx.state.local, &peer) {
        Ok(role) => role,
        Err(error) => {
            tracing::debug!(%peer, %error, "Not pairing");
            return false;
        }
    };

    if tx.state.peers.observe(peer) {
        tx.register_peer(peer);
    }

    indicator::exit(tx);
    tracing::info!(%peer, %role, "Role determined");
    cycle::enter(tx, role);
    liveness::arm(tx);
    true
}
