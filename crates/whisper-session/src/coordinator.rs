//! Per-peer session state machine.
//!
//! A single task owns every piece of mutable session state: the local key
//! pair, the public-key registry, the peer directory, the inbox and the
//! transfer records. Transport notifications and user commands are funnelled
//! through one mailbox and handled to completion, one at a time, after which
//! a fresh snapshot is published.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use whisper_crypto::keys::fingerprint;
use whisper_crypto::{import_public_key, PeerKeyPair, PublicKey};
use whisper_protocol::codec::{decode_envelope, encode_envelope};
use whisper_protocol::discovery::advertisement;
use whisper_protocol::{Envelope, Payload, PayloadKind, PeerId, PeerIdentity, SessionState};

use crate::config::{ProfileExchange, SessionConfig};
use crate::directory::PeerDirectory;
use crate::error::{SessionError, TransferError};
use crate::handle::{Command, SessionEvent, SessionHandle, SessionSnapshot};
use crate::inbox::{FileSlot, Inbox};
use crate::preferences::{PreferenceStore, Preferences};
use crate::registry::PublicKeyRegistry;
use crate::transfer::ResourceTransfers;
use crate::transport::{Transport, TransportEvent};

pub struct SessionCoordinator<T: Transport> {
    config: SessionConfig,
    store: Box<dyn PreferenceStore>,
    preferences: Preferences,
    transport: Arc<T>,
    local: PeerIdentity,

    key_pair: Option<PeerKeyPair>,
    registry: PublicKeyRegistry,
    /// Keys received while the sender's session is still `Connecting`.
    pending_keys: HashMap<PeerId, PublicKey>,
    /// Peers that withdrew their key; they get ours again when they re-key.
    withdrawn: HashSet<PeerId>,
    /// Peers whose profile is held back until their key arrives.
    awaiting_profile: HashSet<PeerId>,

    states: HashMap<PeerId, SessionState>,
    directory: PeerDirectory,
    transfers: ResourceTransfers,
    inbox: Inbox,

    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> SessionCoordinator<T> {
    /// Load preferences and, if encryption is enabled, generate the local key pair.
    ///
    /// The returned handle (and its clones) are the only senders into the
    /// mailbox; the coordinator stops once all of them are dropped.
    pub fn new(
        config: SessionConfig,
        store: Box<dyn PreferenceStore>,
        transport: Arc<T>,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let preferences = store.load().map_err(SessionError::Preferences)?;
        let key_pair = if preferences.is_encryption_enabled {
            Some(PeerKeyPair::generate()?)
        } else {
            None
        };
        let local = PeerIdentity::generate(preferences.display_name.clone());

        let (commands_tx, commands) = mpsc::channel(config.mailbox_capacity.max(1));
        let (events, _) = broadcast::channel(config.mailbox_capacity.max(16));
        let (snapshots, _) = watch::channel(Arc::new(SessionSnapshot {
            local: local.clone(),
            encryption_enabled: preferences.is_encryption_enabled,
            browsing: preferences.is_browsing,
            advertising: preferences.is_advertising,
            states: HashMap::new(),
            found: Vec::new(),
            connecting: Vec::new(),
            connected: Vec::new(),
            not_connected: Vec::new(),
            keyed_peers: Vec::new(),
            inbox: Inbox::default(),
        }));

        if let Some(pair) = &key_pair {
            info!(fingerprint = %pair.fingerprint(), "generated local key pair");
        }

        let handle = SessionHandle {
            commands: commands_tx,
            snapshots: snapshots.subscribe(),
            events: events.clone(),
        };

        let coordinator = Self {
            transfers: ResourceTransfers::new(config.storage_dir.clone()),
            config,
            store,
            preferences,
            transport,
            local,
            key_pair,
            registry: PublicKeyRegistry::new(),
            pending_keys: HashMap::new(),
            withdrawn: HashSet::new(),
            awaiting_profile: HashSet::new(),
            states: HashMap::new(),
            directory: PeerDirectory::new(),
            inbox: Inbox::default(),
            commands,
            snapshots,
            events,
        };
        Ok((coordinator, handle))
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        self.start();

        loop {
            let Some(command) = self.commands.recv().await else {
                info!("all session handles dropped");
                self.stop();
                break;
            };
            if !self.handle_command(command).await {
                break;
            }
        }
        info!(local = %self.local, "session coordinator stopped");
    }

    /// Advertise the local identity and resume browsing if enabled.
    pub fn start(&mut self) {
        let info = advertisement(self.preferences.is_advertising);
        if let Err(e) = self
            .transport
            .advertise(&self.local, &self.config.service_type, &info)
        {
            error!("failed to start advertising: {}", e);
        }
        if self.preferences.is_browsing {
            if let Err(e) = self
                .transport
                .start_browsing(&self.local, &self.config.service_type)
            {
                error!("failed to start browsing: {}", e);
            }
        }
        info!(
            local = %self.local,
            advertising = self.preferences.is_advertising,
            browsing = self.preferences.is_browsing,
            encryption = self.preferences.is_encryption_enabled,
            "session started"
        );
        self.publish();
    }

    fn stop(&mut self) {
        self.transport.stop_advertising();
        self.transport.stop_browsing();
    }

    /// Apply one command and publish the result. Returns false on shutdown.
    pub async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Transport(event) => self.handle_transport_event(event).await,
            Command::Send { payload, to } => {
                let _ = self.send(payload, &to);
            }
            Command::SendResource { path, to } => self.send_resource(&path, &to),
            Command::Invite(peer) => {
                if let Err(e) = self.transport.invite(&peer) {
                    warn!(%peer, "invite failed: {}", e);
                }
            }
            Command::RespondToInvitation { peer, accept } => {
                if let Err(e) = self.transport.respond_to_invitation(&peer, accept) {
                    warn!(%peer, accept, "invitation response failed: {}", e);
                }
            }
            Command::SetEncryption(enabled) => self.set_encryption(enabled),
            Command::SetBrowsing(enabled) => self.set_browsing(enabled),
            Command::UpdatePreferences(preferences) => self.update_preferences(preferences),
            Command::MarkSeen { peer, slot } => self.inbox.mark_seen(&peer, slot),
            Command::Shutdown => {
                info!("shutdown requested");
                self.stop();
                self.publish();
                return false;
            }
        }
        self.publish();
        true
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound { peer, info } => {
                if peer.id == self.local.id {
                    return;
                }
                if self.directory.on_peer_found(peer.clone(), &info) {
                    debug!(%peer, "peer found");
                    self.states.insert(peer.id, SessionState::Discovering);
                }
            }
            TransportEvent::PeerLost { peer } => {
                if self.directory.on_peer_lost(&peer) {
                    debug!(%peer, "peer lost");
                    if self.states.get(&peer) == Some(&SessionState::Discovering) {
                        self.states.remove(&peer);
                    }
                }
            }
            TransportEvent::StateChanged { peer, state } => self.on_state_changed(peer, state),
            TransportEvent::Data { from, bytes } => self.on_data(from, &bytes),
            TransportEvent::ResourceStarted { from, name } => {
                self.transfers.begin_receiving(from.id, &name);
            }
            TransportEvent::ResourceFinished {
                from,
                name,
                temp_location,
                error,
            } => {
                let location = self
                    .transfers
                    .complete_receiving(from.id, &name, temp_location.as_deref(), error.as_deref())
                    .await
                    .ok();
                self.transfers.take_finished(&from.id, &name);
                self.inbox.store_file(
                    from.id,
                    FileSlot {
                        name: name.clone(),
                        location: location.clone(),
                    },
                );
                self.emit(SessionEvent::TransferFinished {
                    peer: from.id,
                    name,
                    location,
                });
            }
            TransportEvent::InvitationReceived { from } => {
                info!(peer = %from, "session invitation received");
                self.emit(SessionEvent::InvitationReceived { peer: from });
            }
        }
    }

    fn on_state_changed(&mut self, peer: PeerIdentity, state: SessionState) {
        let previous = self.states.insert(peer.id, state);
        if previous == Some(state) {
            debug!(%peer, ?state, "duplicate state change ignored");
            return;
        }
        info!(%peer, ?state, "session state changed");

        if state != SessionState::Connected && self.registry.remove(&peer.id).is_some() {
            debug!(%peer, "dropped peer public key");
        }

        match state {
            SessionState::Connected => {
                if let Some(key) = self.pending_keys.remove(&peer.id) {
                    self.register_key(&peer, key);
                }
                self.send_handshake(&peer.id);
            }
            SessionState::NotConnected => {
                self.pending_keys.remove(&peer.id);
                self.withdrawn.remove(&peer.id);
                self.awaiting_profile.remove(&peer.id);
            }
            SessionState::Discovering | SessionState::Connecting => {}
        }

        self.directory.on_state_changed(peer.clone(), state);
        self.emit(SessionEvent::StateChanged { peer, state });
    }

    /// Public key first, then profile.
    fn send_handshake(&mut self, peer: &PeerId) {
        match &self.key_pair {
            Some(pair) => {
                let _ = self.send(Payload::PublicKey(pair.export_public_key()), peer);
            }
            None => debug!(%peer, "encryption disabled, no public key to send"),
        }

        let defer = self.config.profile_exchange == ProfileExchange::AwaitPeerKey
            && self.encryption_active()
            && !self.registry.contains(peer);
        if defer {
            debug!(%peer, "profile deferred until peer key arrives");
            self.awaiting_profile.insert(*peer);
        } else {
            self.send_profile(peer);
        }
    }

    fn send_profile(&self, peer: &PeerId) {
        let _ = self.send(Payload::Profile(self.preferences.profile()), peer);
    }

    fn encryption_active(&self) -> bool {
        self.preferences.is_encryption_enabled && self.key_pair.is_some()
    }

    /// Bytes of the local public key, as sent during the handshake.
    pub fn export_public_key(&self) -> Result<Vec<u8>, SessionError> {
        self.key_pair
            .as_ref()
            .map(PeerKeyPair::export_public_key)
            .ok_or(SessionError::NoLocalKey)
    }

    /// Encrypt (when possible) and hand a payload to the transport.
    pub fn send(&self, payload: Payload, to: &PeerId) -> Result<(), SessionError> {
        let kind = payload.kind();
        let result = self.try_send(payload, to);
        if let Err(e) = &result {
            warn!(peer = %to, ?kind, "send failed: {}", e);
            self.emit(SessionEvent::SendFailed {
                peer: *to,
                kind: Some(kind),
                reason: e.to_string(),
            });
        }
        result
    }

    fn try_send(&self, payload: Payload, to: &PeerId) -> Result<(), SessionError> {
        if self.states.get(to) != Some(&SessionState::Connected) {
            return Err(SessionError::NotConnected(*to));
        }
        let kind = payload.kind();
        let plaintext = payload.to_bytes()?;

        let recipient_key = match kind {
            PayloadKind::PublicKey => None,
            _ if self.preferences.is_encryption_enabled => self.registry.get(to),
            _ => None,
        };
        let envelope = match recipient_key {
            Some(key) => Envelope::sealed(kind, whisper_crypto::encrypt(&plaintext, key)?),
            None => Envelope::plain(kind, plaintext),
        };

        let bytes = encode_envelope(&envelope)?;
        self.transport.send_reliable(bytes, to)?;
        debug!(peer = %to, ?kind, sealed = envelope.sealed, "envelope queued");
        Ok(())
    }

    fn send_resource(&self, path: &Path, to: &PeerId) {
        let result = self.try_send_resource(path, to);
        if let Err(e) = result {
            warn!(peer = %to, path = %path.display(), "resource send failed: {}", e);
            self.emit(SessionEvent::SendFailed {
                peer: *to,
                kind: None,
                reason: e.to_string(),
            });
        }
    }

    fn try_send_resource(&self, path: &Path, to: &PeerId) -> Result<(), SessionError> {
        if self.states.get(to) != Some(&SessionState::Connected) {
            return Err(SessionError::NotConnected(*to));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;
        self.transport.send_resource(path, name, to)?;
        Ok(())
    }

    fn on_data(&mut self, from: PeerIdentity, bytes: &[u8]) {
        let envelope = match decode_envelope(bytes, self.config.max_envelope_bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer = %from, "dropping malformed envelope: {}", e);
                self.emit(SessionEvent::DecodeFailed {
                    peer: from.id,
                    reason: e.to_string(),
                });
                return;
            }
        };

        match envelope.kind {
            PayloadKind::PublicKey => self.on_public_key(from, envelope),
            PayloadKind::Message | PayloadKind::Image | PayloadKind::Profile => {
                self.on_payload(from, envelope)
            }
        }
    }

    fn on_public_key(&mut self, from: PeerIdentity, envelope: Envelope) {
        if envelope.sealed {
            warn!(peer = %from, "ignoring sealed public key");
            self.emit(SessionEvent::KeyRejected {
                peer: from.id,
                reason: "public key must be sent in the clear".into(),
            });
            return;
        }

        if envelope.data.is_empty() {
            let registered = self.registry.remove(&from.id).is_some();
            let pending = self.pending_keys.remove(&from.id).is_some();
            if registered || pending {
                info!(peer = %from, "peer withdrew its public key");
                self.withdrawn.insert(from.id);
                self.emit(SessionEvent::KeyWithdrawn { peer: from.id });
            }
            self.release_held_profile(&from);
            return;
        }

        let key = match import_public_key(&envelope.data) {
            Ok(key) => key,
            Err(e) => {
                warn!(peer = %from, "rejecting public key: {}", e);
                self.emit(SessionEvent::KeyRejected {
                    peer: from.id,
                    reason: e.to_string(),
                });
                return;
            }
        };

        match self.states.get(&from.id) {
            Some(SessionState::Connected) => {}
            Some(SessionState::Connecting) => {
                debug!(peer = %from, "holding public key until session connects");
                self.pending_keys.insert(from.id, key);
                return;
            }
            state => {
                debug!(peer = %from, ?state, "dropping public key outside a session");
                return;
            }
        }

        let previous = self.register_key(&from, key);
        let rekeyed = previous.is_some_and(|old| old.as_bytes() != key.as_bytes());
        let returning = self.withdrawn.remove(&from.id);
        if rekeyed || returning {
            // The peer started over with a new key and has lost ours.
            if let Some(pair) = &self.key_pair {
                let _ = self.send(Payload::PublicKey(pair.export_public_key()), &from.id);
            }
        }
        if self.awaiting_profile.remove(&from.id) {
            self.send_profile(&from.id);
        }
    }

    /// Send a profile held for the peer's key, unsealed.
    fn release_held_profile(&mut self, peer: &PeerIdentity) {
        if self.awaiting_profile.remove(&peer.id) {
            debug!(%peer, "peer is not keyed, sending held profile");
            self.send_profile(&peer.id);
        }
    }

    fn register_key(&mut self, peer: &PeerIdentity, key: PublicKey) -> Option<PublicKey> {
        let previous = self.registry.register(peer.id, key);
        info!(%peer, fingerprint = %fingerprint(&key), "registered peer public key");
        self.emit(SessionEvent::KeyRegistered { peer: peer.id });
        previous
    }

    fn on_payload(&mut self, from: PeerIdentity, envelope: Envelope) {
        let kind = envelope.kind;
        if !envelope.sealed {
            // A peer talking in the clear has no key to send us.
            self.release_held_profile(&from);
        }
        let plaintext = if envelope.sealed {
            let Some(pair) = &self.key_pair else {
                warn!(peer = %from, ?kind, "sealed payload but no local key pair");
                self.emit(SessionEvent::DecryptFailed {
                    peer: from.id,
                    kind,
                    reason: SessionError::NoLocalKey.to_string(),
                });
                return;
            };
            match whisper_crypto::decrypt(&envelope.data, pair) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!(peer = %from, ?kind, "dropping payload: {}", e);
                    self.emit(SessionEvent::DecryptFailed {
                        peer: from.id,
                        kind,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        } else if self.config.accept_plaintext {
            envelope.data
        } else {
            warn!(peer = %from, ?kind, "dropping unencrypted payload");
            self.emit(SessionEvent::PlaintextRejected { peer: from.id, kind });
            return;
        };

        match Payload::from_bytes(kind, plaintext) {
            Ok(payload) => {
                self.inbox.store(from.id, payload);
                debug!(peer = %from, ?kind, sealed = envelope.sealed, "payload received");
                self.emit(SessionEvent::Received { peer: from.id, kind });
            }
            Err(e) => {
                warn!(peer = %from, ?kind, "undecodable payload: {}", e);
                self.emit(SessionEvent::DecodeFailed {
                    peer: from.id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn set_encryption(&mut self, enabled: bool) {
        if enabled == self.preferences.is_encryption_enabled && enabled == self.key_pair.is_some() {
            return;
        }
        self.preferences.is_encryption_enabled = enabled;
        self.persist_preferences();

        let connected = self.connected_peers();
        if enabled {
            if self.key_pair.is_none() {
                match PeerKeyPair::generate() {
                    Ok(pair) => {
                        info!(fingerprint = %pair.fingerprint(), "encryption enabled, generated key pair");
                        self.key_pair = Some(pair);
                    }
                    Err(e) => {
                        error!("failed to generate key pair: {}", e);
                        return;
                    }
                }
            }
            if let Some(pair) = &self.key_pair {
                let exported = pair.export_public_key();
                for peer in &connected {
                    let _ = self.send(Payload::PublicKey(exported.clone()), peer);
                }
            }
        } else {
            self.key_pair = None;
            self.registry.clear();
            self.pending_keys.clear();
            info!("encryption disabled, local and peer keys cleared");
            for peer in &connected {
                let _ = self.send(Payload::PublicKey(Vec::new()), peer);
            }
            for peer in std::mem::take(&mut self.awaiting_profile) {
                self.send_profile(&peer);
            }
        }
    }

    fn set_browsing(&mut self, enabled: bool) {
        self.preferences.is_browsing = enabled;
        self.persist_preferences();
        if enabled {
            if let Err(e) = self
                .transport
                .start_browsing(&self.local, &self.config.service_type)
            {
                error!("failed to start browsing: {}", e);
            }
        } else {
            self.transport.stop_browsing();
        }
    }

    /// Persist edited preferences and re-initialise under a new local identity.
    fn update_preferences(&mut self, preferences: Preferences) {
        self.preferences = preferences;
        self.persist_preferences();

        self.stop();
        self.transport.disconnect_all();
        self.directory.clear();
        self.states.clear();
        self.registry.clear();
        self.pending_keys.clear();
        self.withdrawn.clear();
        self.awaiting_profile.clear();

        if !self.preferences.is_encryption_enabled {
            self.key_pair = None;
        } else if self.key_pair.is_none() {
            match PeerKeyPair::generate() {
                Ok(pair) => self.key_pair = Some(pair),
                Err(e) => error!("failed to generate key pair: {}", e),
            }
        }

        self.local = PeerIdentity::generate(self.preferences.display_name.clone());
        self.start();
    }

    fn persist_preferences(&self) {
        if let Err(e) = self.store.save(&self.preferences) {
            error!("failed to save preferences: {:#}", e);
            self.emit(SessionEvent::PreferencesNotSaved {
                reason: format!("{e:#}"),
            });
        }
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.states
            .iter()
            .filter(|(_, state)| **state == SessionState::Connected)
            .map(|(peer, _)| *peer)
            .collect()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let mut keyed_peers: Vec<PeerId> = self.registry.peers().copied().collect();
        keyed_peers.sort();
        let snapshot = SessionSnapshot {
            local: self.local.clone(),
            encryption_enabled: self.preferences.is_encryption_enabled,
            browsing: self.preferences.is_browsing,
            advertising: self.preferences.is_advertising,
            states: self.states.clone(),
            found: self.directory.found().to_vec(),
            connecting: self.directory.connecting().to_vec(),
            connected: self.directory.connected().to_vec(),
            not_connected: self.directory.not_connected().to_vec(),
            keyed_peers,
            inbox: self.inbox.clone(),
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local
    }

    pub fn state_of(&self, peer: &PeerId) -> Option<SessionState> {
        self.states.get(peer).copied()
    }

    pub fn has_local_key(&self) -> bool {
        self.key_pair.is_some()
    }

    pub fn registry(&self) -> &PublicKeyRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn transfers(&self) -> &ResourceTransfers {
        &self.transfers
    }
}
