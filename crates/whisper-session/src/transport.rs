//! Boundary with the underlying mesh transport.
//!
//! The transport owns radio discovery, connection setup and reliable
//! delivery. Calls into it must not block on network I/O: they hand work
//! off and return. Everything it observes comes back as a [`TransportEvent`]
//! delivered through [`SessionHandle::deliver`](crate::SessionHandle::deliver).

use std::path::{Path, PathBuf};

use whisper_protocol::{DiscoveryInfo, PeerId, PeerIdentity, SessionState};

use crate::error::TransportError;

pub trait Transport: Send + Sync + 'static {
    /// Start advertising the local identity with the given payload.
    fn advertise(
        &self,
        local: &PeerIdentity,
        service_type: &str,
        info: &DiscoveryInfo,
    ) -> Result<(), TransportError>;

    fn stop_advertising(&self);

    fn start_browsing(&self, local: &PeerIdentity, service_type: &str) -> Result<(), TransportError>;

    fn stop_browsing(&self);

    /// Ask a discovered peer to join a session.
    fn invite(&self, peer: &PeerId) -> Result<(), TransportError>;

    fn respond_to_invitation(&self, peer: &PeerId, accept: bool) -> Result<(), TransportError>;

    /// Tear down every open session.
    fn disconnect_all(&self);

    /// Queue `bytes` for reliable, ordered delivery to `peer`.
    fn send_reliable(&self, bytes: Vec<u8>, peer: &PeerId) -> Result<(), TransportError>;

    /// Queue a file for delivery to `peer` under `name`.
    fn send_resource(&self, path: &Path, name: &str, peer: &PeerId) -> Result<(), TransportError>;
}

/// Notifications raised by the transport, in no particular order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerFound {
        peer: PeerIdentity,
        info: DiscoveryInfo,
    },
    PeerLost {
        peer: PeerId,
    },
    StateChanged {
        peer: PeerIdentity,
        state: SessionState,
    },
    Data {
        from: PeerIdentity,
        bytes: Vec<u8>,
    },
    ResourceStarted {
        from: PeerIdentity,
        name: String,
    },
    ResourceFinished {
        from: PeerIdentity,
        name: String,
        temp_location: Option<PathBuf>,
        error: Option<String>,
    },
    InvitationReceived {
        from: PeerIdentity,
    },
}
