use crate::core::NodeIdentity;

/// The tracked peer and whether the link has been told about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    /// The peer's link address
    pub address: NodeIdentity,
    /// Registered with the link adapter for unicast
    pub registered: bool,
}

/// Tracks the single peer of a two-node pairing.
///
/// A peer is never forgotten: a heartbeat timeout keeps the entry and
/// discovery either confirms it again or replaces it with whoever answers.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peer: Option<PeerInfo>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        PeerRegistry { peer: None }
    }

    /// Records `address` as the peer.
    ///
    /// Returns true when the link still has to register it, that is for a
    /// first peer, a different peer, or one whose registration never happened.
    pub fn observe(&mut self, address: NodeIdentity) -> bool {
        match self.peer {
            Some(peer) if peer.address == address => !peer.registered,
            Some(peer) => {
                tracing::info!(old = %peer.address, new = %address, "Peer replaced");
                self.peer = Some(PeerInfo {
                    address,
                    registered: false,
                });
                true
            }
            None => {
                self.peer = Some(PeerInfo {
                    address,
                    registered: false,
                });
                true
            }
        }
    }

    /// Marks the current peer as registered with the link
    pub fn mark_registered(&mut self) {
        if let Some(peer) = self.peer.as_mut() {
            peer.registered = true;
        }
    }

    pub fn peer(&self) -> Option<PeerInfo> {
        self.peer
    }

    pub fn address(&self) -> Option<NodeIdentity> {
        self.peer.map(|peer| peer.address)
    }

    /// True if `address` is the tracked peer
    pub fn is_peer(&self, address: &NodeIdentity) -> bool {
        self.peer.map_or(false, |peer| peer.address == *address)
    }
}
