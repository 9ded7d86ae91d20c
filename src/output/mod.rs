//! Light output collaborator
//!
//! Three logical signals, each on or off. Hardware bindings implement
//! [`LightOutput`]; [`TracingLights`] records the current lamp pattern and
//! logs every change, which is what the host demos drive.

use std::fmt;

use crate::core::LightState;

/// One lamp of the traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Stop,
    Caution,
    Go,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Stop, Signal::Caution, Signal::Go];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Stop => "stop",
            Signal::Caution => "caution",
            Signal::Go => "go",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lamp pattern shown for a light state, as (stop, caution, go)
pub fn pattern(light: LightState) -> [(Signal, bool); 3] {
    let (stop, caution, go) = match light {
        LightState::Stop | LightState::GoToStop => (true, false, false),
        LightState::CautionToGo => (true, true, false),
        LightState::Go => (false, false, true),
    };
    [(Signal::Stop, stop), (Signal::Caution, caution), (Signal::Go, go)]
}

/// Sink for signal writes
pub trait LightOutput {
    fn set(&mut self, signal: Signal, on: bool);
}

/// Current on/off state of the three lamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lamps {
    pub stop: bool,
    pub caution: bool,
    pub go: bool,
}

impl Lamps {
    pub fn get(&self, signal: Signal) -> bool {
        match signal {
            Signal::Stop => self.stop,
            Signal::Caution => self.caution,
            Signal::Go => self.go,
        }
    }

    pub fn set(&mut self, signal: Signal, on: bool) {
        match signal {
            Signal::Stop => self.stop = on,
            Signal::Caution => self.caution = on,
            Signal::Go => self.go = on,
        }
    }

    /// True for the pattern `light` maps to
    pub fn shows(&self, light: LightState) -> bool {
        pattern(light).iter().all(|(signal, on)| self.get(*signal) == *on)
    }
}

impl fmt::Display for Lamps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lamp = |on: bool, c: char| if on { c } else { '.' };
        write!(
            f,
            "[{}{}{}]",
            lamp(self.stop, 'R'),
            lamp(self.caution, 'Y'),
            lamp(self.go, 'G')
        )
    }
}

/// Light output that keeps the lamp state and logs changes
#[derive(Debug, Default)]
pub struct TracingLights {
    label: String,
    lamps: Lamps,
}

impl TracingLights {
    pub fn new(label: impl Into<String>) -> Self {
        TracingLights {
            label: label.into(),
            lamps: Lamps::default(),
        }
    }

    pub fn lamps(&self) -> Lamps {
        self.lamps
    }
}

impl LightOutput for TracingLights {
    fn set(&mut self, signal: Signal, on: bool) {
        if self.lamps.get(signal) == on {
            return;
        }
        self.lamps.set(signal, on);
        tracing::debug!(node = %self.label, %signal, on, lamps = %self.lamps, "Signal changed");
    }
}
