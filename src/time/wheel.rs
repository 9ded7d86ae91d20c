use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::core::{Error, Result};
use super::{Tick, TimerKind, TimerService};

/// Timer service backed by one tokio task per running timer.
///
/// Ticks are pushed into the node's inbound channel. Every `start` bumps the
/// kind's generation, so the receiver can tell a tick that was already queued
/// when its timer was restarted from a live one (see [`TokioTimers::is_current`]).
pub struct TokioTimers<T> {
    tx: mpsc::Sender<T>,
    tasks: HashMap<TimerKind, JoinHandle<()>>,
    generations: HashMap<TimerKind, u64>,
}

impl<T> TokioTimers<T>
where
    T: From<Tick> + Send + 'static,
{
    /// Creates a timer service delivering ticks into `tx`
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        TokioTimers {
            tx,
            tasks: HashMap::new(),
            generations: HashMap::new(),
        }
    }

    /// True if `tick` came from the running instance of its timer
    pub fn is_current(&self, tick: &Tick) -> bool {
        self.tasks.contains_key(&tick.kind)
            && self.generations.get(&tick.kind) == Some(&tick.generation)
    }

    /// Number of timers currently scheduled
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    fn next_generation(&mut self, kind: TimerKind) -> u64 {
        let generation = self.generations.entry(kind).or_insert(0);
        *generation += 1;
        *generation
    }
}

impl<T> TimerService for TokioTimers<T>
where
    T: From<Tick> + Send + 'static,
{
    fn start(&mut self, kind: TimerKind, period: Duration, periodic: bool) -> Result<()> {
        if period.is_zero() {
            return Err(Error::timer(format!("{kind} started with a zero period")));
        }
        let handle = Handle::try_current()
            .map_err(|e| Error::timer(format!("no tokio runtime for {kind}: {e}")))?;

        self.stop(kind)?;
        let tick = Tick {
            kind,
            generation: self.next_generation(kind),
        };
        let tx = self.tx.clone();

        let task = if periodic {
            handle.spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if tx.send(T::from(tick)).await.is_err() {
                        break;
                    }
                }
            })
        } else {
            handle.spawn(async move {
                sleep(period).await;
                let _ = tx.send(T::from(tick)).await;
            })
        };

        tracing::trace!(timer = %kind, ?period, periodic, generation = tick.generation, "Timer started");
        self.tasks.insert(kind, task);
        Ok(())
    }

    fn stop(&mut self, kind: TimerKind) -> Result<()> {
        if let Some(task) = self.tasks.remove(&kind) {
            task.abort();
            tracing::trace!(timer = %kind, "Timer stopped");
        }
        Ok(())
    }
}

impl<T> Drop for TokioTimers<T> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
