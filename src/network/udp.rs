use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::BytesCodec;
use tokio_util::udp::UdpFramed;

use crate::core::{Error, NodeIdentity, Result};
use crate::protocol::Message;
use super::{Frame, LinkAdapter, LinkConfig, FRAME_CHANNEL_CAPACITY};

/// Socket addresses learned from address-carrying frames
#[derive(Debug, Default)]
struct AddressBook {
    by_identity: HashMap<NodeIdentity, SocketAddr>,
    by_addr: HashMap<SocketAddr, NodeIdentity>,
}

impl AddressBook {
    fn learn(&mut self, identity: NodeIdentity, addr: SocketAddr) {
        if let Some(old) = self.by_identity.insert(identity, addr) {
            if old == addr {
                return;
            }
            self.by_addr.remove(&old);
            tracing::debug!(%identity, %old, new = %addr, "Node moved");
        }
        self.by_addr.insert(addr, identity);
    }

    fn identity(&self, addr: &SocketAddr) -> Option<NodeIdentity> {
        self.by_addr.get(addr).copied()
    }

    fn addr(&self, identity: &NodeIdentity) -> Option<SocketAddr> {
        self.by_identity.get(identity).copied()
    }
}

/// Link adapter over a UDP socket.
///
/// Broadcasts go to every configured broadcast address. Unicast needs the
/// peer's socket address, which the receive task learns from the address a
/// Hello, Heartbeat or addressed Ack carries.
pub struct UdpLink {
    local: NodeIdentity,
    socket: Arc<UdpSocket>,
    broadcast_addrs: Vec<SocketAddr>,
    book: Arc<Mutex<AddressBook>>,
    registered: HashSet<NodeIdentity>,
    receiver: JoinHandle<()>,
}

impl UdpLink {
    /// Binds the socket and starts the receive task. Received frames are
    /// delivered on the returned channel.
    pub async fn bind(
        local: NodeIdentity,
        config: &LinkConfig,
    ) -> Result<(Self, mpsc::Receiver<Frame>)> {
        let socket = Arc::new(bind_socket(config.bind_addr)?);
        let book = Arc::new(Mutex::new(AddressBook::default()));
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        let framed = UdpFramed::new(Arc::clone(&socket), BytesCodec::new());
        let receiver = tokio::spawn(receive(framed, Arc::clone(&book), tx));

        tracing::info!(
            node = %local,
            addr = %socket.local_addr()?,
            broadcast = ?config.broadcast_addrs,
            "UDP link up"
        );

        let link = UdpLink {
            local,
            socket,
            broadcast_addrs: config.broadcast_addrs.clone(),
            book,
            registered: HashSet::new(),
            receiver,
        };
        Ok((link, rx))
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Adds a destination for broadcasts
    pub fn add_broadcast_addr(&mut self, addr: SocketAddr) {
        if !self.broadcast_addrs.contains(&addr) {
            self.broadcast_addrs.push(addr);
        }
    }

    fn lookup(&self, identity: &NodeIdentity) -> Result<Option<SocketAddr>> {
        let book = self
            .book
            .lock()
            .map_err(|_| Error::link("address book lock poisoned"))?;
        Ok(book.addr(identity))
    }

    fn send_to(&self, frame: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket
            .try_send_to(frame, addr)
            .map(|_| ())
            .map_err(|e| Error::link(format!("send to {addr} failed: {e}")))
    }
}

impl LinkAdapter for UdpLink {
    fn local(&self) -> NodeIdentity {
        self.local
    }

    fn broadcast(&mut self, frame: &[u8]) -> Result<()> {
        for addr in &self.broadcast_addrs {
            self.send_to(frame, *addr)?;
        }
        Ok(())
    }

    fn send(&mut self, to: &NodeIdentity, frame: &[u8]) -> Result<()> {
        if !self.registered.contains(to) {
            return Err(Error::link(format!("{to} is not a registered peer")));
        }
        let addr = self
            .lookup(to)?
            .ok_or_else(|| Error::link(format!("no address for {to}")))?;
        self.send_to(frame, addr)
    }

    fn register_peer(&mut self, peer: &NodeIdentity) -> Result<()> {
        let addr = self
            .lookup(peer)?
            .ok_or_else(|| Error::link(format!("{peer} has never been heard from")))?;
        tracing::debug!(%peer, %addr, "Peer registered");
        self.registered.insert(*peer);
        Ok(())
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::link(format!("failed to bind {addr}: {e}")))?;
    Ok(UdpSocket::from_std(socket.into())?)
}

async fn receive(
    mut framed: UdpFramed<BytesCodec, Arc<UdpSocket>>,
    book: Arc<Mutex<AddressBook>>,
    tx: mpsc::Sender<Frame>,
) {
    while let Some(item) = framed.next().await {
        let (bytes, src) = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(error = %e, "UDP receive failed");
                continue;
            }
        };
        let payload = bytes.freeze();

        let claimed = Message::decode(&payload)
            .ok()
            .and_then(|m| m.address())
            .filter(|id| !id.is_broadcast() && !id.is_unspecified());
        let from = match book.lock() {
            Ok(mut book) => match claimed {
                Some(identity) => {
                    book.learn(identity, src);
                    Some(identity)
                }
                None => book.identity(&src),
            },
            Err(_) => None,
        };

        let Some(from) = from else {
            tracing::trace!(%src, len = payload.len(), "Dropping frame from unknown sender");
            continue;
        };
        if tx.send(Frame { from, payload }).await.is_err() {
            break;
        }
    }
}
