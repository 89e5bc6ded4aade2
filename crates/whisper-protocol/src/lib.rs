//! Whisper wire protocol: peer identities, discovery advertisements and the
//! tagged payload envelope exchanged between peers.

pub mod codec;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod types;

pub use discovery::DiscoveryInfo;
pub use envelope::{Envelope, Payload, PayloadKind};
pub use error::ProtocolError;
pub use types::{PeerId, PeerIdentity, ProfileSnapshot, SessionState};
