use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::{Error, NodeIdentity, Result};
use super::{Frame, LinkAdapter, FRAME_CHANNEL_CAPACITY};

/// Silences one direction of a [`MemoryLink`] pair from outside the node
#[derive(Debug, Clone, Default)]
pub struct DropSwitch(Arc<AtomicBool>);

impl DropSwitch {
    pub fn set_drop(&self, dropping: bool) {
        self.0.store(dropping, Ordering::Relaxed);
    }

    pub fn is_dropping(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One end of an in-process radio shared by exactly two nodes.
///
/// Frames go straight into the other end's receive channel. A full channel
/// loses the frame, like a busy radio.
#[derive(Debug)]
pub struct MemoryLink {
    local: NodeIdentity,
    remote: NodeIdentity,
    tx: mpsc::Sender<Frame>,
    registered: bool,
    switch: DropSwitch,
}

impl MemoryLink {
    /// Creates two connected ends, each with the receiver for its inbound frames
    pub fn pair(
        a: NodeIdentity,
        b: NodeIdentity,
    ) -> ((MemoryLink, mpsc::Receiver<Frame>), (MemoryLink, mpsc::Receiver<Frame>)) {
        let (a_tx, a_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        let end = |local, remote, tx| MemoryLink {
            local,
            remote,
            tx,
            registered: false,
            switch: DropSwitch::default(),
        };
        ((end(a, b, b_tx), a_rx), (end(b, a, a_tx), b_rx))
    }

    /// Drops (or stops dropping) every frame this end sends
    pub fn set_drop(&self, dropping: bool) {
        self.switch.set_drop(dropping);
    }

    /// Handle for [`set_drop`](Self::set_drop) that outlives a move of the link
    pub fn drop_switch(&self) -> DropSwitch {
        self.switch.clone()
    }

    fn deliver(&self, frame: &[u8]) -> Result<()> {
        if self.switch.is_dropping() {
            tracing::trace!(node = %self.local, len = frame.len(), "Frame lost");
            return Ok(());
        }

        let frame = Frame {
            from: self.local,
            payload: Bytes::copy_from_slice(frame),
        };
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::link("receive queue full"),
            mpsc::error::TrySendError::Closed(_) => Error::link("peer end closed"),
        })
    }
}

impl LinkAdapter for MemoryLink {
    fn local(&self) -> NodeIdentity {
        self.local
    }

    fn broadcast(&mut self, frame: &[u8]) -> Result<()> {
        self.deliver(frame)
    }

    fn send(&mut self, to: &NodeIdentity, frame: &[u8]) -> Result<()> {
        if *to != self.remote || !self.registered {
            return Err(Error::link(format!("{to} is not a registered peer")));
        }
        self.deliver(frame)
    }

    fn register_peer(&mut self, peer: &NodeIdentity) -> Result<()> {
        if *peer != self.remote {
            return Err(Error::link(format!("{peer} is not in range")));
        }
        self.registered = true;
        Ok(())
    }
}
