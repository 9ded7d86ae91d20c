//! Async host for one protocol node
//!
//! [`Node`] owns a [`ProtocolDriver`] and its collaborators: a link adapter,
//! a light output and a tokio timer service. Frames and timer ticks are fed to
//! the driver one at a time and every effect it returns is performed before
//! the next event is taken.

mod config;

pub use self::config::NodeConfig;

use bytes::BytesMut;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Encoder;

use crate::core::{Error, Result};
use crate::network::{Frame, LinkAdapter};
use crate::output::LightOutput;
use crate::protocol::{Effect, Event, Message, MessageCodec, ProtocolDriver, StateInfo};
use crate::time::{Tick, TimerService, TokioTimers};

/// Tick capacity of the timer channel; one slot per timer kind is enough
const TICK_CHANNEL_CAPACITY: usize = 16;

/// A running protocol node
pub struct Node<L, O> {
    driver: ProtocolDriver,
    link: L,
    frames: mpsc::Receiver<Frame>,
    lights: O,
    timers: TokioTimers<Tick>,
    ticks: mpsc::Receiver<Tick>,
    codec: MessageCodec,
    buffer: BytesMut,
    status: watch::Sender<StateInfo>,
}

impl<L, O> Node<L, O>
where
    L: LinkAdapter,
    O: LightOutput,
{
    /// Assembles a node. `frames` is the receive channel of `link`.
    pub fn new(
        driver: ProtocolDriver,
        link: L,
        frames: mpsc::Receiver<Frame>,
        lights: O,
    ) -> Result<Self> {
        if driver.local() != link.local() {
            return Err(Error::config(format!(
                "driver identity {} does not match link identity {}",
                driver.local(),
                link.local()
            )));
        }

        let (tick_tx, ticks) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(driver.state_info());

        Ok(Node {
            driver,
            link,
            frames,
            lights,
            timers: TokioTimers::new(tick_tx),
            ticks,
            codec: MessageCodec::new(),
            buffer: BytesMut::with_capacity(crate::protocol::MAX_MESSAGE_SIZE),
            status,
        })
    }

    /// Watches the driver's state summary, updated after every event
    pub fn subscribe(&self) -> watch::Receiver<StateInfo> {
        self.status.subscribe()
    }

    pub fn driver(&self) -> &ProtocolDriver {
        &self.driver
    }

    pub fn lights(&self) -> &O {
        &self.lights
    }

    /// Starts the driver and processes events until the link's receive
    /// channel closes
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(node = %self.driver.local(), "Node starting");
        let effects = self.driver.start();
        self.apply(effects);

        loop {
            tokio::select! {
                frame = self.frames.recv() => match frame {
                    Some(Frame { from, payload }) => {
                        self.dispatch(Event::MessageArrived { from, payload });
                    }
                    None => {
                        tracing::info!(node = %self.driver.local(), "Link closed, node stopping");
                        return Ok(());
                    }
                },
                Some(tick) = self.ticks.recv() => {
                    if self.timers.is_current(&tick) {
                        self.dispatch(Event::TimerFired(tick.kind));
                    } else {
                        tracing::trace!(timer = %tick.kind, generation = tick.generation, "Stale tick");
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let effects = self.driver.handle(event);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            if let Err(error) = self.perform(effect) {
                tracing::warn!(node = %self.driver.local(), %error, "Effect failed");
            }
        }

        let info = self.driver.state_info();
        self.status.send_if_modified(|current| {
            if *current == info {
                false
            } else {
                *current = info;
                true
            }
        });
    }

    fn perform(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::Broadcast(message) => {
                self.encode(message)?;
                self.link.broadcast(&self.buffer)
            }
            Effect::Send { to, message } => {
                self.encode(message)?;
                self.link.send(&to, &self.buffer)
            }
            Effect::RegisterPeer(peer) => self.link.register_peer(&peer),
            Effect::SetSignal { signal, on } => {
                self.lights.set(signal, on);
                Ok(())
            }
            Effect::StartTimer {
                kind,
                period,
                periodic,
            } => self.timers.start(kind, period, periodic),
            Effect::StopTimer(kind) => self.timers.stop(kind),
        }
    }

    fn encode(&mut self, message: Message) -> Result<()> {
        self.buffer.clear();
        self.codec.encode(message, &mut self.buffer)
    }
}
