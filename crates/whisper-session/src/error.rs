use thiserror::Error;

use whisper_crypto::CryptoError;
use whisper_protocol::{PeerId, ProtocolError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport rejected the operation: {0}")]
    Rejected(String),

    #[error("peer {0} is not reachable")]
    UnknownPeer(PeerId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport reported no temporary file")]
    MissingTemporaryFile,

    #[error("transfer failed in transport: {0}")]
    Transport(String),

    #[error("invalid resource name: {0:?}")]
    InvalidName(String),

    #[error("failed to copy resource into storage: {source}")]
    Copy { source: std::io::Error },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),

    #[error("no local key pair (encryption disabled)")]
    NoLocalKey,

    #[error("session mailbox is full")]
    MailboxFull,

    #[error("session coordinator has stopped")]
    Closed,

    #[error("preference store error: {0:#}")]
    Preferences(anyhow::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}
