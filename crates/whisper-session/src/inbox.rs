//! Latest received item per peer, as read by the presentation layer.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use bytes::Bytes;

use whisper_protocol::{Payload, PeerId, ProfileSnapshot};

/// Which inbox slot a "received" flag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboxSlot {
    Message,
    Image,
    Profile,
    File,
}

/// Outcome of the most recent file transfer from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlot {
    pub name: String,
    /// `None` when the transfer finished without a stored artifact.
    pub location: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Inbox {
    pub messages: HashMap<PeerId, String>,
    pub images: HashMap<PeerId, Bytes>,
    pub profiles: HashMap<PeerId, ProfileSnapshot>,
    pub files: HashMap<PeerId, FileSlot>,
    unread: HashSet<(PeerId, InboxSlot)>,
}

impl Inbox {
    /// Replace the peer's slot for this payload and flag it as received.
    /// Returns the slot written, or `None` for key payloads, which have no slot.
    pub fn store(&mut self, peer: PeerId, payload: Payload) -> Option<InboxSlot> {
        let slot = match payload {
            Payload::Message(text) => {
                self.messages.insert(peer, text);
                InboxSlot::Message
            }
            Payload::Image(data) => {
                self.images.insert(peer, data);
                InboxSlot::Image
            }
            Payload::Profile(profile) => {
                self.profiles.insert(peer, profile);
                InboxSlot::Profile
            }
            Payload::PublicKey(_) => return None,
        };
        self.unread.insert((peer, slot));
        Some(slot)
    }

    pub fn store_file(&mut self, peer: PeerId, file: FileSlot) {
        self.files.insert(peer, file);
        self.unread.insert((peer, InboxSlot::File));
    }

    pub fn is_unread(&self, peer: &PeerId, slot: InboxSlot) -> bool {
        self.unread.contains(&(*peer, slot))
    }

    pub fn mark_seen(&mut self, peer: &PeerId, slot: InboxSlot) {
        self.unread.remove(&(*peer, slot));
    }
}
