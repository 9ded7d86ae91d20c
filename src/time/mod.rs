//! Timer collaborator
//!
//! The protocol only names timers; it never sleeps. A [`TimerService`] owns
//! the actual scheduling and reports each fire back into the node's event
//! loop as a [`Tick`]. Timers are independent and cancellable, and starting a
//! timer that is already running replaces the running instance.
//!
//! [`TokioTimers`] is the tokio-backed service used by the node runtime.

mod wheel;

pub use self::wheel::TokioTimers;

use std::fmt;
use std::time::Duration;

use crate::core::Result;

/// The named timers the protocol uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Periodic heartbeat emission while roles are determined
    HeartbeatSend,
    /// Dead-man timer, restarted by every message from the peer
    HeartbeatTimeout,
    /// CAUTION blink while undetermined
    UndeterminedBlink,
    /// Hello re-broadcast while undetermined
    HelloBroadcast,
    /// One-shot delay between light phases of the master's cycle
    CyclePhase,
}

impl TimerKind {
    /// Every timer kind, in declaration order
    pub const ALL: [TimerKind; 5] = [
        TimerKind::HeartbeatSend,
        TimerKind::HeartbeatTimeout,
        TimerKind::UndeterminedBlink,
        TimerKind::HelloBroadcast,
        TimerKind::CyclePhase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::HeartbeatSend => "heartbeat-send",
            TimerKind::HeartbeatTimeout => "heartbeat-timeout",
            TimerKind::UndeterminedBlink => "undetermined-blink",
            TimerKind::HelloBroadcast => "hello-broadcast",
            TimerKind::CyclePhase => "cycle-phase",
        }
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of timer kinds, used to track which timers are running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSet(u8);

impl TimerSet {
    pub fn new() -> Self {
        TimerSet(0)
    }

    pub fn insert(&mut self, kind: TimerKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: TimerKind) -> bool {
        let present = self.contains(kind);
        self.0 &= !kind.bit();
        present
    }

    pub fn contains(&self, kind: TimerKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TimerKind> + '_ {
        TimerKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl FromIterator<TimerKind> for TimerSet {
    fn from_iter<I: IntoIterator<Item = TimerKind>>(iter: I) -> Self {
        let mut set = TimerSet::new();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// A timer fire delivered into the event loop.
///
/// `generation` identifies the timer instance; a tick from an instance that
/// has since been stopped or restarted is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Scheduling collaborator consumed by the node runtime
pub trait TimerService {
    /// Starts `kind`, cancelling any running instance first
    fn start(&mut self, kind: TimerKind, period: Duration, periodic: bool) -> Result<()>;

    /// Cancels `kind`; stopping an idle timer is a no-op
    fn stop(&mut self, kind: TimerKind) -> Result<()>;
}
