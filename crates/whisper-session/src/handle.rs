//! The cloneable front door to a running session coordinator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};

use whisper_protocol::{Payload, PayloadKind, PeerId, PeerIdentity, SessionState};

use crate::error::SessionError;
use crate::inbox::{Inbox, InboxSlot};
use crate::preferences::Preferences;
use crate::transport::TransportEvent;

/// Everything the coordinator acts on, processed one at a time.
#[derive(Debug)]
pub enum Command {
    Transport(TransportEvent),
    Send { payload: Payload, to: PeerId },
    SendResource { path: PathBuf, to: PeerId },
    Invite(PeerId),
    RespondToInvitation { peer: PeerId, accept: bool },
    SetEncryption(bool),
    SetBrowsing(bool),
    UpdatePreferences(Preferences),
    MarkSeen { peer: PeerId, slot: InboxSlot },
    Shutdown,
}

/// Outcomes that callers cannot observe from a fire-and-forget command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged { peer: PeerIdentity, state: SessionState },
    KeyRegistered { peer: PeerId },
    KeyWithdrawn { peer: PeerId },
    KeyRejected { peer: PeerId, reason: String },
    Received { peer: PeerId, kind: PayloadKind },
    DecryptFailed { peer: PeerId, kind: PayloadKind, reason: String },
    PlaintextRejected { peer: PeerId, kind: PayloadKind },
    DecodeFailed { peer: PeerId, reason: String },
    /// `kind` is `None` for file sends.
    SendFailed { peer: PeerId, kind: Option<PayloadKind>, reason: String },
    TransferFinished { peer: PeerId, name: String, location: Option<PathBuf> },
    InvitationReceived { peer: PeerIdentity },
    PreferencesNotSaved { reason: String },
}

/// Immutable view of session state after a fully processed command.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub local: PeerIdentity,
    pub encryption_enabled: bool,
    pub browsing: bool,
    pub advertising: bool,
    pub states: HashMap<PeerId, SessionState>,
    pub found: Vec<PeerIdentity>,
    pub connecting: Vec<PeerIdentity>,
    pub connected: Vec<PeerIdentity>,
    pub not_connected: Vec<PeerIdentity>,
    /// Peers whose public key is registered.
    pub keyed_peers: Vec<PeerId>,
    pub inbox: Inbox,
}

impl SessionSnapshot {
    pub fn state_of(&self, peer: &PeerId) -> Option<SessionState> {
        self.states.get(peer).copied()
    }

    pub fn has_key_for(&self, peer: &PeerId) -> bool {
        self.keyed_peers.contains(peer)
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) snapshots: watch::Receiver<Arc<SessionSnapshot>>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Hand a transport notification to the coordinator.
    pub fn deliver(&self, event: TransportEvent) -> Result<(), SessionError> {
        self.submit(Command::Transport(event))
    }

    /// Queue a payload for `to`. Failures are reported as [`SessionEvent::SendFailed`].
    pub fn send(&self, payload: Payload, to: PeerId) -> Result<(), SessionError> {
        self.submit(Command::Send { payload, to })
    }

    pub fn send_resource(&self, path: impl Into<PathBuf>, to: PeerId) -> Result<(), SessionError> {
        self.submit(Command::SendResource {
            path: path.into(),
            to,
        })
    }

    pub fn invite(&self, peer: PeerId) -> Result<(), SessionError> {
        self.submit(Command::Invite(peer))
    }

    pub fn respond_to_invitation(&self, peer: PeerId, accept: bool) -> Result<(), SessionError> {
        self.submit(Command::RespondToInvitation { peer, accept })
    }

    pub fn set_encryption(&self, enabled: bool) -> Result<(), SessionError> {
        self.submit(Command::SetEncryption(enabled))
    }

    pub fn set_browsing(&self, enabled: bool) -> Result<(), SessionError> {
        self.submit(Command::SetBrowsing(enabled))
    }

    pub fn update_preferences(&self, preferences: Preferences) -> Result<(), SessionError> {
        self.submit(Command::UpdatePreferences(preferences))
    }

    pub fn mark_seen(&self, peer: PeerId, slot: InboxSlot) -> Result<(), SessionError> {
        self.submit(Command::MarkSeen { peer, slot })
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.submit(Command::Shutdown)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn submit(&self, command: Command) -> Result<(), SessionError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::MailboxFull,
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }
}
