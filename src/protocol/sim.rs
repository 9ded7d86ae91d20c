//! Deterministic two-node harness for the protocol driver.
//!
//! Nodes exchange frames over a lossless link with fixed latency on a virtual
//! millisecond clock. Frames can be dropped per sender, either all of them or
//! by a predicate, and held back or delivered twice by further predicates.
//! After every event the harness checks the driver's
//! invariants, that its timer set matches the timers the harness is running,
//! and that the two GO lamps are never lit together.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use crate::core::{NodeIdentity, ProtocolConfig, Role};
use crate::output::{Lamps, Signal};
use crate::time::{TimerKind, TimerSet};
use super::driver::ProtocolDriver;
use super::event::{Effect, Event};
use super::message::Message;

pub(crate) const LATENCY_MS: u64 = 5;

type DropRule = Box<dyn FnMut(&Message) -> bool>;

/// Extra delay in ms for a frame, `None` to leave it alone
type DelayRule = Box<dyn FnMut(&Message) -> Option<u64>>;

#[derive(Debug, Clone, Copy)]
struct SimTimer {
    due: u64,
    period: Option<u64>,
}

struct Delivery {
    at: u64,
    seq: u64,
    to: usize,
    from: NodeIdentity,
    payload: Bytes,
}

pub(crate) struct SimNode {
    pub driver: ProtocolDriver,
    pub lamps: Lamps,
    timers: BTreeMap<TimerKind, SimTimer>,
    registered: Vec<NodeIdentity>,
    /// Drop every frame this node sends
    pub muted: bool,
    drop_rules: Vec<DropRule>,
    delay_rules: Vec<DelayRule>,
    duplicate_rules: Vec<DelayRule>,
    go_since: Option<u64>,
}

/// A GO phase as seen on the lamps: node index, on and off times in ms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GoPhase {
    pub node: usize,
    pub on: u64,
    pub off: u64,
}

pub(crate) struct Sim {
    pub now: u64,
    pub nodes: [SimNode; 2],
    deliveries: Vec<Delivery>,
    seq: u64,
    pub go_log: Vec<GoPhase>,
    pub dropped: usize,
    pub duplicated: usize,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Rule yielding `value` for the next `count` messages of `kind`
fn countdown<T: Copy>(
    kind: &'static str,
    count: usize,
    value: T,
) -> impl FnMut(&Message) -> Option<T> {
    let mut left = count;
    move |message| {
        if left > 0 && message.kind() == kind {
            left -= 1;
            Some(value)
        } else {
            None
        }
    }
}

impl Sim {
    /// Two nodes with default timing and fixed seeds, both started at t=0
    pub fn new(a: NodeIdentity, b: NodeIdentity) -> Self {
        let config = |seed| ProtocolConfig {
            rng_seed: Some(seed),
            ..Default::default()
        };
        Sim::with_configs((a, config(11)), (b, config(29)))
    }

    pub fn with_configs(
        a: (NodeIdentity, ProtocolConfig),
        b: (NodeIdentity, ProtocolConfig),
    ) -> Self {
        let node = |(identity, config): (NodeIdentity, ProtocolConfig)| SimNode {
            driver: ProtocolDriver::new(identity, config).unwrap(),
            lamps: Lamps::default(),
            timers: BTreeMap::new(),
            registered: Vec::new(),
            muted: false,
            drop_rules: Vec::new(),
            delay_rules: Vec::new(),
            duplicate_rules: Vec::new(),
            go_since: None,
        };

        let mut sim = Sim {
            now: 0,
            nodes: [node(a), node(b)],
            deliveries: Vec::new(),
            seq: 0,
            go_log: Vec::new(),
            dropped: 0,
            duplicated: 0,
        };
        for index in 0..2 {
            let effects = sim.nodes[index].driver.start();
            sim.apply(index, effects);
            sim.check(index);
        }
        sim
    }

    /// Drops frames from node `index` for which `rule` returns true
    pub fn drop_when(&mut self, index: usize, rule: impl FnMut(&Message) -> bool + 'static) {
        self.nodes[index].drop_rules.push(Box::new(rule));
    }

    /// Drops the next `count` frames of `kind` sent by node `index`
    pub fn drop_next(&mut self, index: usize, kind: &'static str, count: usize) {
        let mut matches = countdown(kind, count, ());
        self.drop_when(index, move |message| matches(message).is_some());
    }

    /// Holds frames from node `index` back by the delay `rule` returns
    pub fn delay_when(&mut self, index: usize, rule: impl FnMut(&Message) -> Option<u64> + 'static) {
        self.nodes[index].delay_rules.push(Box::new(rule));
    }

    /// Delays the next `count` frames of `kind` sent by node `index` by `ms`
    pub fn delay_next(&mut self, index: usize, kind: &'static str, count: usize, ms: u64) {
        self.delay_when(index, countdown(kind, count, ms));
    }

    /// Delivers a second copy of frames from node `index`, the delay `rule`
    /// returns after the first
    pub fn duplicate_when(
        &mut self,
        index: usize,
        rule: impl FnMut(&Message) -> Option<u64> + 'static,
    ) {
        self.nodes[index].duplicate_rules.push(Box::new(rule));
    }

    /// Duplicates the next `count` frames of `kind` sent by node `index`,
    /// the copy arriving `ms` after the original
    pub fn duplicate_next(&mut self, index: usize, kind: &'static str, count: usize, ms: u64) {
        self.duplicate_when(index, countdown(kind, count, ms));
    }

    pub fn driver(&self, index: usize) -> &ProtocolDriver {
        &self.nodes[index].driver
    }

    pub fn roles(&self) -> [Option<Role>; 2] {
        [self.nodes[0].driver.role(), self.nodes[1].driver.role()]
    }

    /// True once the nodes hold complementary roles and each tracks the other
    pub fn paired(&self) -> bool {
        let [a, b] = &self.nodes;
        let complementary = matches!(
            self.roles(),
            [Some(Role::Master), Some(Role::Slave)] | [Some(Role::Slave), Some(Role::Master)]
        );
        complementary
            && a.driver.peer() == Some(b.driver.local())
            && b.driver.peer() == Some(a.driver.local())
    }

    /// Processes every event up to and including time `until`
    pub fn run_until(&mut self, until: u64) {
        while self.step(until) {}
        self.now = until;
    }

    pub fn run_for(&mut self, ms: u64) {
        self.run_until(self.now + ms);
    }

    /// Runs until `done` holds, at most `limit` ms. Returns the time it held.
    pub fn run_until_cond(&mut self, limit: u64, done: impl Fn(&Sim) -> bool) -> Option<u64> {
        let until = self.now + limit;
        loop {
            if done(self) {
                return Some(self.now);
            }
            if !self.step(until) {
                self.now = until;
                return done(self).then_some(self.now);
            }
        }
    }

    /// Processes the earliest event due by `until`; false if there is none
    fn step(&mut self, until: u64) -> bool {
        let delivery = self
            .deliveries
            .iter()
            .enumerate()
            .min_by_key(|(_, d)| (d.at, d.seq))
            .map(|(i, d)| (d.at, i));

        let timer = (0..2)
            .flat_map(|index| {
                self.nodes[index]
                    .timers
                    .iter()
                    .map(move |(kind, timer)| (timer.due, index, *kind))
            })
            .min();

        // Deliveries win ties so a frame and a timeout at the same instant
        // resolve the same way on every run.
        let deliver = match (delivery, timer) {
            (Some((at, _)), Some((due, _, _))) => at <= due,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return false,
        };

        if deliver {
            let Some((at, position)) = delivery else { return false };
            if at > until {
                return false;
            }
            let Delivery {
                to, from, payload, ..
            } = self.deliveries.swap_remove(position);
            self.now = at;
            let effects = self.nodes[to]
                .driver
                .handle(Event::MessageArrived { from, payload });
            self.apply(to, effects);
            self.check(to);
        } else {
            let Some((due, index, kind)) = timer else { return false };
            if due > until {
                return false;
            }
            self.now = due;
            let node = &mut self.nodes[index];
            match node.timers.get(&kind).and_then(|t| t.period) {
                Some(period) => {
                    if let Some(timer) = node.timers.get_mut(&kind) {
                        timer.due += period;
                    }
                }
                None => {
                    node.timers.remove(&kind);
                }
            }
            let effects = self.nodes[index].driver.handle(Event::TimerFired(kind));
            self.apply(index, effects);
            self.check(index);
        }
        true
    }

    fn apply(&mut self, index: usize, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Broadcast(message) => self.transmit(index, None, message),
                Effect::Send { to, message } => {
                    assert!(
                        self.nodes[index].registered.contains(&to),
                        "node {index} sent {message} to unregistered {to}"
                    );
                    self.transmit(index, Some(to), message);
                }
                Effect::RegisterPeer(peer) => {
                    let registered = &mut self.nodes[index].registered;
                    if !registered.contains(&peer) {
                        registered.push(peer);
                    }
                }
                Effect::SetSignal { signal, on } => self.set_signal(index, signal, on),
                Effect::StartTimer {
                    kind,
                    period,
                    periodic,
                } => {
                    let period = millis(period);
                    self.nodes[index].timers.insert(
                        kind,
                        SimTimer {
                            due: self.now + period,
                            period: periodic.then_some(period),
                        },
                    );
                }
                Effect::StopTimer(kind) => {
                    self.nodes[index].timers.remove(&kind);
                }
            }
        }
    }

    fn transmit(&mut self, index: usize, to: Option<NodeIdentity>, message: Message) {
        let other = 1 - index;
        let receiver = self.nodes[other].driver.local();
        let node = &mut self.nodes[index];
        let mut lost = node.muted;
        for rule in node.drop_rules.iter_mut() {
            lost |= rule(&message);
        }
        if lost {
            self.dropped += 1;
            return;
        }

        if to.is_some_and(|to| to != receiver) {
            return;
        }

        let delay: u64 = node.delay_rules.iter_mut().filter_map(|rule| rule(&message)).sum();
        let mut arrivals = vec![self.now + LATENCY_MS + delay];
        for rule in node.duplicate_rules.iter_mut() {
            if let Some(extra) = rule(&message) {
                arrivals.push(arrivals[0] + extra);
            }
        }
        self.duplicated += arrivals.len() - 1;

        let from = node.driver.local();
        let payload = Bytes::from(message.to_bytes());
        for at in arrivals {
            self.seq += 1;
            self.deliveries.push(Delivery {
                at,
                seq: self.seq,
                to: other,
                from,
                payload: payload.clone(),
            });
        }
    }

    fn set_signal(&mut self, index: usize, signal: Signal, on: bool) {
        let now = self.now;
        let node = &mut self.nodes[index];
        node.lamps.set(signal, on);
        if signal != Signal::Go {
            return;
        }
        match (on, node.go_since) {
            (true, None) => node.go_since = Some(now),
            (false, Some(since)) => {
                node.go_since = None;
                self.go_log.push(GoPhase {
                    node: index,
                    on: since,
                    off: now,
                });
            }
            _ => {}
        }
    }

    fn check(&self, index: usize) {
        let node = &self.nodes[index];
        if let Err(error) = node.driver.state().check_invariants() {
            panic!("node {index} at {}ms: {error}", self.now);
        }

        let running: TimerSet = node.timers.keys().copied().collect();
        assert_eq!(
            running,
            node.driver.active_timers(),
            "node {index} at {}ms: running timers diverged",
            self.now
        );

        if let Some(light) = node.driver.light() {
            assert!(
                node.lamps.shows(light),
                "node {index} at {}ms shows {} in {light}",
                self.now,
                node.lamps
            );
        }

        assert!(
            !(self.nodes[0].lamps.go && self.nodes[1].lamps.go),
            "both nodes show GO at {}ms",
            self.now
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LightState;
    use crate::protocol::NodeState;

    fn a() -> NodeIdentity {
        NodeIdentity([0x01, 0, 0, 0, 0, 0])
    }

    fn b() -> NodeIdentity {
        NodeIdentity([0x02, 0, 0, 0, 0, 0])
    }

    fn assert_alternates(log: &[GoPhase]) {
        for pair in log.windows(2) {
            assert_ne!(pair[0].node, pair[1].node, "GO did not alternate: {log:?}");
            assert!(pair[0].off <= pair[1].on);
        }
    }

    #[test]
    fn test_nodes_pair_on_first_hello() {
        let mut sim = Sim::new(a(), b());
        let at = sim.run_until_cond(100, Sim::paired).expect("paired");

        assert_eq!(at, LATENCY_MS);
        assert_eq!(sim.roles(), [Some(Role::Master), Some(Role::Slave)]);
        assert!(sim.driver(1).awaiting_change());
        assert!(sim.nodes[0].lamps.shows(LightState::Stop));
        assert!(sim.nodes[1].lamps.shows(LightState::Stop));
    }

    #[test]
    fn test_undetermined_blinks_alone() {
        let mut sim = Sim::new(a(), b());
        sim.nodes[1].muted = true;
        sim.nodes[0].muted = true;

        let mut seen = Vec::new();
        for _ in 0..4 {
            sim.run_for(500);
            seen.push(sim.nodes[0].lamps.caution);
            assert!(!sim.nodes[0].lamps.stop && !sim.nodes[0].lamps.go);
        }
        assert_eq!(seen, vec![true, false, true, false]);
        assert_eq!(sim.driver(0).node_state(), NodeState::Undetermined);
    }

    #[test]
    fn test_pairs_when_first_hello_lost() {
        let mut sim = Sim::new(a(), b());
        sim.drop_next(0, "hello", 1);

        sim.run_until_cond(100, Sim::paired).expect("paired from b's hello");
        assert_eq!(sim.roles(), [Some(Role::Master), Some(Role::Slave)]);
    }

    #[test]
    fn test_pairs_when_both_first_hellos_lost() {
        let mut sim = Sim::new(a(), b());
        sim.drop_next(0, "hello", 1);
        sim.drop_next(1, "hello", 1);

        let at = sim.run_until_cond(2_000, Sim::paired).expect("paired");
        assert_eq!(at, 1_000 + LATENCY_MS);
    }

    #[test]
    fn test_strict_alternation() {
        let mut sim = Sim::new(a(), b());
        sim.run_for(600_000);

        assert!(sim.go_log.len() >= 50, "only {} GO phases", sim.go_log.len());
        assert_eq!(sim.go_log[0].node, 0);
        assert_alternates(&sim.go_log);
        for phase in &sim.go_log {
            let green = phase.off - phase.on;
            assert!((5_000..10_000).contains(&green), "GO lasted {green}ms");
        }

        let [first, second] = [sim.driver(0), sim.driver(1)];
        assert_eq!(first.state_info().resets, 0);
        assert_eq!(second.state_info().resets, 0);
        assert!(first.handoffs() + second.handoffs() >= sim.go_log.len() as u64);
    }

    #[test]
    fn test_master_cycle_timing() {
        let mut sim = Sim::new(a(), b());
        sim.run_until_cond(100, Sim::paired).expect("paired");
        let paired_at = sim.now;

        sim.run_until(paired_at + 999);
        assert_eq!(sim.driver(0).light(), Some(LightState::Stop));
        sim.run_until(paired_at + 1_000);
        assert_eq!(sim.driver(0).light(), Some(LightState::CautionToGo));
        sim.run_until(paired_at + 2_000);
        assert_eq!(sim.driver(0).light(), Some(LightState::Go));
        assert!(sim.nodes[1].lamps.shows(LightState::Stop));
    }

    #[test]
    fn test_silence_resets_both_and_they_repair() {
        let mut sim = Sim::new(a(), b());
        sim.run_for(20_000);
        assert!(sim.paired());

        sim.nodes[0].muted = true;
        sim.nodes[1].muted = true;
        sim.run_for(3_100);
        assert_eq!(sim.driver(0).node_state(), NodeState::Undetermined);
        assert_eq!(sim.driver(1).node_state(), NodeState::Undetermined);
        assert!(!sim.nodes[0].lamps.go && !sim.nodes[1].lamps.go);

        sim.nodes[0].muted = false;
        sim.nodes[1].muted = false;
        sim.run_until_cond(1_100, Sim::paired).expect("re-paired");
        let repaired = sim.go_log.len();
        assert_eq!(sim.roles(), [Some(Role::Master), Some(Role::Slave)]);
        assert_eq!(sim.driver(0).state_info().resets, 1);
        assert_eq!(sim.driver(1).state_info().resets, 1);

        sim.run_for(60_000);
        assert_alternates(&sim.go_log[repaired..]);
    }

    #[test]
    fn test_one_way_silence_resets_both() {
        let mut sim = Sim::new(a(), b());
        sim.run_for(15_000);
        assert!(sim.paired());

        // b stops hearing a but a still hears b. b resets first, and its
        // Hellos must not keep a alive.
        sim.nodes[0].muted = true;
        sim.run_until_cond(3_100, |sim| {
            sim.driver(1).node_state() == NodeState::Undetermined
        })
        .expect("b reset");
        sim.run_until_cond(3_100, |sim| {
            sim.driver(0).node_state() == NodeState::Undetermined
        })
        .expect("a reset");

        sim.nodes[0].muted = false;
        sim.run_until_cond(1_100, Sim::paired).expect("re-paired");
        let repaired = sim.go_log.len();
        sim.run_for(60_000);
        assert_alternates(&sim.go_log[repaired..]);
    }

    #[test]
    fn test_lost_ack_recovers_without_reset() {
        let mut sim = Sim::new(a(), b());
        sim.run_until_cond(100, Sim::paired).expect("paired");

        // b's first Change acknowledgement is lost.
        sim.drop_next(1, "change-ack", 1);
        sim.run_until_cond(12_000, |sim| sim.driver(1).role() == Some(Role::Master))
            .expect("b took control");
        assert!(sim.driver(0).handoff_pending());
        assert!(sim.nodes[0].lamps.shows(LightState::Stop));

        sim.run_for(120_000);
        assert_eq!(sim.dropped, 1);
        assert_eq!(sim.driver(0).state_info().resets, 0);
        assert_eq!(sim.driver(1).state_info().resets, 0);
        assert!(sim.go_log.len() >= 10);
        assert_alternates(&sim.go_log);
    }

    #[test]
    fn test_duplicate_change_does_not_restart_cycle() {
        let mut sim = Sim::new(a(), b());
        sim.run_until_cond(100, Sim::paired).expect("paired");
        sim.run_until_cond(12_000, |sim| sim.driver(1).role() == Some(Role::Master))
            .expect("handoff");
        let handoffs = sim.driver(1).handoffs();

        // Replay the Change into b as if the link duplicated it.
        let effects = sim.nodes[1]
            .driver
            .handle(Event::message(a(), Message::Change { flag: 1 }));
        sim.apply(1, effects);
        sim.check(1);
        assert_eq!(sim.driver(1).handoffs(), handoffs);
        assert_eq!(sim.driver(1).role(), Some(Role::Master));

        sim.run_for(60_000);
        assert_alternates(&sim.go_log);
    }

    /// Stop and caution of 1s each and GO of exactly 1s
    fn fixed_cycle(seed: u64) -> ProtocolConfig {
        ProtocolConfig {
            go_min: Duration::from_millis(1_000),
            go_max: Duration::from_millis(1_001),
            rng_seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_late_copy_of_change_during_handback() {
        let mut sim = Sim::with_configs((a(), fixed_cycle(1)), (b(), fixed_cycle(2)));
        sim.run_until_cond(100, Sim::paired).expect("paired");

        // a hands over at 3005ms and b takes control at 3010ms. b hands back
        // at 6010ms, its Change held up for a second. Meanwhile a copy of a's
        // Change turns up at 6510ms while b waits for its Ack.
        sim.duplicate_next(0, "change", 1, 3_500);
        sim.delay_next(1, "change", 1, 1_000);

        sim.run_until(6_500);
        assert_eq!(sim.roles(), [Some(Role::Slave), Some(Role::Master)]);
        assert!(sim.driver(1).handoff_pending());
        sim.run_until(6_600);
        assert_eq!(sim.duplicated, 1);
        assert_eq!(sim.roles(), [Some(Role::Slave), Some(Role::Master)]);
        assert!(sim.driver(1).handoff_pending());
        assert_eq!(sim.driver(1).light(), Some(LightState::GoToStop));

        sim.run_until(7_100);
        assert_eq!(sim.roles(), [Some(Role::Master), Some(Role::Slave)]);

        sim.run_for(60_000);
        assert_eq!(sim.driver(0).state_info().resets, 0);
        assert_eq!(sim.driver(1).state_info().resets, 0);
        assert!(sim.go_log.len() >= 10);
        assert_alternates(&sim.go_log);
    }

    #[test]
    fn test_duplicated_and_late_frames_keep_go_exclusive() {
        let mut sim = Sim::new(a(), b());
        // Every frame arrives twice, and every Change a third time long after
        // the handoff it belonged to.
        for index in 0..2 {
            sim.duplicate_when(index, |_| Some(40));
            sim.duplicate_when(index, |message| {
                matches!(message, Message::Change { .. }).then_some(7_000)
            });
        }
        sim.run_for(600_000);

        assert!(sim.duplicated > 500);
        assert!(sim.go_log.len() >= 50, "only {} GO phases", sim.go_log.len());
        assert_alternates(&sim.go_log);
        assert_eq!(sim.driver(0).state_info().resets, 0);
        assert_eq!(sim.driver(1).state_info().resets, 0);
    }

    #[test]
    fn test_lost_change_is_resent() {
        let mut sim = Sim::new(a(), b());
        sim.run_until_cond(100, Sim::paired).expect("paired");

        sim.drop_next(0, "change", 1);
        sim.run_until_cond(12_000, |sim| sim.driver(0).handoff_pending())
            .expect("a handed over");
        let sent_at = sim.now;
        sim.run_until_cond(2_100, |sim| sim.driver(1).role() == Some(Role::Master))
            .expect("resent change taken");
        assert!(sim.now - sent_at <= 2_000 + LATENCY_MS);

        sim.run_for(60_000);
        assert_eq!(sim.dropped, 1);
        assert_eq!(sim.driver(0).state_info().resets, 0);
        assert_eq!(sim.driver(1).state_info().resets, 0);
        assert_alternates(&sim.go_log);
    }

    #[test]
    fn test_short_cycle_config() {
        let fast = |seed| ProtocolConfig {
            stop_hold: Duration::from_millis(100),
            caution_hold: Duration::from_millis(100),
            go_min: Duration::from_millis(200),
            go_max: Duration::from_millis(300),
            rng_seed: Some(seed),
            ..Default::default()
        };
        let mut sim = Sim::with_configs((b(), fast(3)), (a(), fast(4)));
        sim.run_for(30_000);

        assert_eq!(sim.roles(), [Some(Role::Slave), Some(Role::Master)]);
        assert_eq!(sim.go_log[0].node, 1);
        assert!(sim.go_log.len() > 40);
        assert_alternates(&sim.go_log);
        for phase in &sim.go_log {
            assert!((200..300).contains(&(phase.off - phase.on)));
        }
    }
}
