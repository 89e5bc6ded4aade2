use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use whisper_protocol::codec::{decode_envelope, MAX_ENVELOPE_SIZE};
use whisper_protocol::{DiscoveryInfo, Envelope, Payload, PayloadKind, PeerId, PeerIdentity, SessionState};
use whisper_session::{
    MemoryPreferenceStore, Preferences, SessionConfig, SessionCoordinator, SessionEvent,
    SessionHandle, SessionSnapshot, Transport, TransportError, TransportEvent,
};

const WAIT: Duration = Duration::from_secs(5);

/// Point-to-point link delivering everything straight into the other side's mailbox.
#[derive(Default)]
struct LinkTransport {
    local: Mutex<Option<PeerIdentity>>,
    remote: OnceLock<SessionHandle>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl LinkTransport {
    fn last_sent(&self) -> Envelope {
        let sent = self.sent.lock().unwrap();
        decode_envelope(sent.last().unwrap(), MAX_ENVELOPE_SIZE).unwrap()
    }

    fn local(&self) -> Result<PeerIdentity, TransportError> {
        self.local
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::Rejected("not advertising".into()))
    }

    fn remote(&self) -> Result<&SessionHandle, TransportError> {
        self.remote
            .get()
            .ok_or_else(|| TransportError::Rejected("link not wired".into()))
    }
}

impl Transport for LinkTransport {
    fn advertise(
        &self,
        local: &PeerIdentity,
        _service_type: &str,
        _info: &DiscoveryInfo,
    ) -> Result<(), TransportError> {
        *self.local.lock().unwrap() = Some(local.clone());
        Ok(())
    }

    fn stop_advertising(&self) {}

    fn start_browsing(&self, _local: &PeerIdentity, _service_type: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn stop_browsing(&self) {}

    fn invite(&self, _peer: &PeerId) -> Result<(), TransportError> {
        Ok(())
    }

    fn respond_to_invitation(&self, _peer: &PeerId, _accept: bool) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect_all(&self) {}

    fn send_reliable(&self, bytes: Vec<u8>, _peer: &PeerId) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(bytes.clone());
        let from = self.local()?;
        self.remote()?
            .deliver(TransportEvent::Data { from, bytes })
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }

    fn send_resource(&self, _path: &Path, _name: &str, _peer: &PeerId) -> Result<(), TransportError> {
        Err(TransportError::Rejected("resources not supported on this link".into()))
    }
}

struct Side {
    handle: SessionHandle,
    transport: Arc<LinkTransport>,
    identity: PeerIdentity,
    task: tokio::task::JoinHandle<()>,
}

fn side(config: SessionConfig, name: &str) -> Side {
    let transport = Arc::new(LinkTransport::default());
    let preferences = Preferences {
        display_name: name.into(),
        ..Preferences::default()
    };
    let (coordinator, handle) = SessionCoordinator::new(
        config,
        Box::new(MemoryPreferenceStore::new(preferences)),
        transport.clone(),
    )
    .unwrap();
    let identity = coordinator.local_identity().clone();
    let task = coordinator.spawn();
    Side {
        handle,
        transport,
        identity,
        task,
    }
}

fn wire(a: &Side, b: &Side) {
    assert!(a.transport.remote.set(b.handle.clone()).is_ok());
    assert!(b.transport.remote.set(a.handle.clone()).is_ok());
}

fn connect(a: &Side, b: &Side) {
    for state in [SessionState::Connecting, SessionState::Connected] {
        a.handle
            .deliver(TransportEvent::StateChanged {
                peer: b.identity.clone(),
                state,
            })
            .unwrap();
        b.handle
            .deliver(TransportEvent::StateChanged {
                peer: a.identity.clone(),
                state,
            })
            .unwrap();
    }
}

async fn wait_until(handle: &SessionHandle, predicate: impl FnMut(&Arc<SessionSnapshot>) -> bool) {
    let mut snapshots = handle.watch();
    timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("coordinator stopped");
}

async fn next_matching(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_until_keyed(a: &Side, b: &Side) {
    let (a_id, b_id) = (a.identity.id, b.identity.id);
    wait_until(&a.handle, |s| s.has_key_for(&b_id)).await;
    wait_until(&b.handle, |s| s.has_key_for(&a_id)).await;
}

async fn shutdown(side: Side) {
    side.handle.shutdown().unwrap();
    timeout(WAIT, side.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn handshake_then_encrypted_hello() {
    let alice = side(SessionConfig::default(), "Alice");
    let bob = side(SessionConfig::default(), "Bob");
    wire(&alice, &bob);
    connect(&alice, &bob);
    wait_until_keyed(&alice, &bob).await;

    let (alice_id, bob_id) = (alice.identity.id, bob.identity.id);
    wait_until(&bob.handle, |s| {
        s.inbox
            .profiles
            .get(&alice_id)
            .is_some_and(|p| p.display_name == "Alice")
    })
    .await;

    alice
        .handle
        .send(Payload::Message("hello".into()), bob_id)
        .unwrap();
    wait_until(&bob.handle, |s| {
        s.inbox.messages.get(&alice_id).map(String::as_str) == Some("hello")
    })
    .await;

    let wire_envelope = alice.transport.last_sent();
    assert_eq!(wire_envelope.kind, PayloadKind::Message);
    assert!(wire_envelope.sealed);
    assert!(!wire_envelope
        .data
        .windows(b"hello".len())
        .any(|w| w == b"hello"));

    shutdown(alice).await;
    shutdown(bob).await;
}

#[tokio::test]
async fn encryption_toggle_round_trip() {
    let alice = side(SessionConfig::default(), "Alice");
    let bob = side(SessionConfig::default(), "Bob");
    wire(&alice, &bob);
    connect(&alice, &bob);
    wait_until_keyed(&alice, &bob).await;
    let (alice_id, bob_id) = (alice.identity.id, bob.identity.id);

    alice.handle.set_encryption(false).unwrap();
    wait_until(&bob.handle, |s| !s.has_key_for(&alice_id)).await;
    wait_until(&alice.handle, |s| !s.encryption_enabled).await;

    alice
        .handle
        .send(Payload::Message("in the clear".into()), bob_id)
        .unwrap();
    wait_until(&bob.handle, |s| {
        s.inbox.messages.get(&alice_id).map(String::as_str) == Some("in the clear")
    })
    .await;
    assert!(!alice.transport.last_sent().sealed);

    // Bob has no key for Alice any more, so his reply is plain too.
    bob.handle
        .send(Payload::Message("got it".into()), alice_id)
        .unwrap();
    wait_until(&alice.handle, |s| {
        s.inbox.messages.get(&bob_id).map(String::as_str) == Some("got it")
    })
    .await;
    assert!(!bob.transport.last_sent().sealed);

    alice.handle.set_encryption(true).unwrap();
    wait_until_keyed(&alice, &bob).await;

    alice
        .handle
        .send(Payload::Message("sealed again".into()), bob_id)
        .unwrap();
    wait_until(&bob.handle, |s| {
        s.inbox.messages.get(&alice_id).map(String::as_str) == Some("sealed again")
    })
    .await;
    assert!(alice.transport.last_sent().sealed);

    shutdown(alice).await;
    shutdown(bob).await;
}

#[tokio::test]
async fn received_files_land_in_storage() {
    let storage = tempfile::tempdir().unwrap();
    let incoming = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        storage_dir: storage.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let bob = side(config, "Bob");
    let alice = PeerIdentity::generate("Alice");
    let mut events = bob.handle.subscribe();

    let temp = incoming.path().join("upload.tmp");
    std::fs::write(&temp, b"file body").unwrap();
    bob.handle
        .deliver(TransportEvent::ResourceStarted {
            from: alice.clone(),
            name: "notes.txt".into(),
        })
        .unwrap();
    bob.handle
        .deliver(TransportEvent::ResourceFinished {
            from: alice.clone(),
            name: "notes.txt".into(),
            temp_location: Some(temp),
            error: None,
        })
        .unwrap();

    let event = next_matching(&mut events, |e| matches!(e, SessionEvent::TransferFinished { .. })).await;
    let SessionEvent::TransferFinished { location, .. } = event else {
        unreachable!()
    };
    let stored = location.expect("file should be stored");
    assert!(stored.starts_with(storage.path()));
    assert_eq!(std::fs::read(&stored).unwrap(), b"file body");

    bob.handle
        .deliver(TransportEvent::ResourceFinished {
            from: alice.clone(),
            name: "broken.bin".into(),
            temp_location: Some(incoming.path().join("does-not-exist")),
            error: None,
        })
        .unwrap();
    let event = next_matching(&mut events, |e| {
        matches!(e, SessionEvent::TransferFinished { name, .. } if name == "broken.bin")
    })
    .await;
    assert_eq!(
        event,
        SessionEvent::TransferFinished {
            peer: alice.id,
            name: "broken.bin".into(),
            location: None,
        }
    );
    assert!(!storage.path().join(alice.id.to_string()).join("broken.bin").exists());

    shutdown(bob).await;
}

#[tokio::test]
async fn dropped_handles_stop_the_coordinator() {
    let bob = side(SessionConfig::default(), "Bob");
    let Side { handle, task, .. } = bob;
    drop(handle);
    timeout(WAIT, task).await.unwrap().unwrap();
}
