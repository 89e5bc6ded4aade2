use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::ProfileSnapshot;

/// Tag carried by every envelope on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    Message,
    Image,
    Profile,
    PublicKey,
}

/// The serialized unit exchanged between peers.
///
/// Encoded positionally as `kind, sealed, data`. `sealed` is a required
/// field: a bare `kind, data` frame does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: PayloadKind,
    /// `data` is ciphertext. Never set for `PublicKey`.
    pub sealed: bool,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn plain(kind: PayloadKind, data: Vec<u8>) -> Self {
        Self {
            kind,
            sealed: false,
            data,
        }
    }

    pub fn sealed(kind: PayloadKind, ciphertext: Vec<u8>) -> Self {
        Self {
            kind,
            sealed: true,
            data: ciphertext,
        }
    }
}

/// Decoded payload contents, one variant per envelope kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Message(String),
    Image(Bytes),
    Profile(ProfileSnapshot),
    /// Raw exported public key. Empty means the sender withdrew its key.
    PublicKey(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Message(_) => PayloadKind::Message,
            Payload::Image(_) => PayloadKind::Image,
            Payload::Profile(_) => PayloadKind::Profile,
            Payload::PublicKey(_) => PayloadKind::PublicKey,
        }
    }

    /// Plaintext bytes to be placed (possibly after sealing) in an envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(match self {
            Payload::Message(text) => text.as_bytes().to_vec(),
            Payload::Image(data) => data.to_vec(),
            Payload::Profile(profile) => postcard::to_allocvec(profile)?,
            Payload::PublicKey(key) => key.clone(),
        })
    }

    /// Interpret plaintext bytes according to `kind`.
    pub fn from_bytes(kind: PayloadKind, data: Vec<u8>) -> Result<Self, ProtocolError> {
        Ok(match kind {
            PayloadKind::Message => {
                Payload::Message(String::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)?)
            }
            PayloadKind::Image => Payload::Image(Bytes::from(data)),
            PayloadKind::Profile => Payload::Profile(postcard::from_bytes(&data)?),
            PayloadKind::PublicKey => Payload::PublicKey(data),
        })
    }
}
