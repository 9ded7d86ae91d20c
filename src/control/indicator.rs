//! Undetermined-state indicator: blink CAUTION and announce ourselves.

use crate::output::Signal;
use crate::protocol::{Message, Transition};
use crate::time::TimerKind;

/// Enters the undetermined display and starts discovery
pub fn enter(tx: &mut Transition<'_>) {
    tx.state.caution_on = false;
    for signal in Signal::ALL {
        tx.set_signal(signal, false);
    }

    let blink = tx.config.blink_period;
    let hello = tx.config.hello_interval;
    tx.start_timer(TimerKind::UndeterminedBlink, blink, true);
    tx.start_timer(TimerKind::HelloBroadcast, hello, true);

    announce(tx);
}

/// Leaves the undetermined display. The caller sets the lamps it needs next.
pub fn exit(tx: &mut Transition<'_>) {
    tx.stop_timer(TimerKind::UndeterminedBlink);
    tx.stop_timer(TimerKind::HelloBroadcast);
    tx.state.caution_on = false;
}

pub fn on_blink(tx: &mut Transition<'_>) {
    tx.state.caution_on = !tx.state.caution_on;
    let on = tx.state.caution_on;
    tx.set_signal(Signal::Caution, on);
}

pub fn on_hello_timer(tx: &mut Transition<'_>) {
    announce(tx);
}

fn announce(tx: &mut Transition<'_>) {
    let address = tx.state.local;
    tracing::trace!(%address, "Broadcasting hello");
    tx.broadcast(Message::Hello { address });
}
