//! Discovery and connection bookkeeping.
//!
//! Each known peer sits in at most one of the four lists. Order is
//! preserved so the UI shows peers in the order they appeared.

use whisper_protocol::discovery::{is_visible, DiscoveryInfo};
use whisper_protocol::{PeerId, PeerIdentity, SessionState};

#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    found: Vec<PeerIdentity>,
    connecting: Vec<PeerIdentity>,
    connected: Vec<PeerIdentity>,
    not_connected: Vec<PeerIdentity>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered peer. Returns true if `found` changed.
    ///
    /// Peers that did not opt in (`show != "Yes"`) are ignored, as are peers
    /// already connecting or connected. A previously dropped peer re-enters
    /// discovery.
    pub fn on_peer_found(&mut self, peer: PeerIdentity, info: &DiscoveryInfo) -> bool {
        if !is_visible(info) {
            return false;
        }
        if contains(&self.found, &peer.id)
            || contains(&self.connecting, &peer.id)
            || contains(&self.connected, &peer.id)
        {
            return false;
        }
        remove(&mut self.not_connected, &peer.id);
        self.found.push(peer);
        true
    }

    /// Forget a peer that stopped advertising. Returns true if it was listed.
    pub fn on_peer_lost(&mut self, id: &PeerId) -> bool {
        remove(&mut self.found, id)
    }

    /// Move a peer to the list matching its new session state.
    pub fn on_state_changed(&mut self, peer: PeerIdentity, state: SessionState) {
        self.remove_everywhere(&peer.id);
        match state {
            SessionState::Discovering => self.found.push(peer),
            SessionState::Connecting => self.connecting.push(peer),
            SessionState::Connected => self.connected.push(peer),
            SessionState::NotConnected => self.not_connected.push(peer),
        }
    }

    /// Drop every peer, e.g. when the local identity is re-created.
    pub fn clear(&mut self) {
        self.found.clear();
        self.connecting.clear();
        self.connected.clear();
        self.not_connected.clear();
    }

    fn remove_everywhere(&mut self, id: &PeerId) {
        remove(&mut self.found, id);
        remove(&mut self.connecting, id);
        remove(&mut self.connected, id);
        remove(&mut self.not_connected, id);
    }

    pub fn found(&self) -> &[PeerIdentity] {
        &self.found
    }

    pub fn connecting(&self) -> &[PeerIdentity] {
        &self.connecting
    }

    pub fn connected(&self) -> &[PeerIdentity] {
        &self.connected
    }

    pub fn not_connected(&self) -> &[PeerIdentity] {
        &self.not_connected
    }
}

fn contains(list: &[PeerIdentity], id: &PeerId) -> bool {
    list.iter().any(|p| &p.id == id)
}

fn remove(list: &mut Vec<PeerIdentity>, id: &PeerId) -> bool {
    let before = list.len();
    list.retain(|p| &p.id != id);
    list.len() != before
}
