//! Whisper peer sessions: discovery bookkeeping, the public-key handshake,
//! encrypted payload exchange and received-file handling, driven by a single
//! coordinator task over a pluggable [`Transport`].

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod handle;
pub mod inbox;
pub mod preferences;
pub mod registry;
pub mod telemetry;
pub mod transfer;
pub mod transport;

pub use config::{ProfileExchange, SessionConfig};
pub use coordinator::SessionCoordinator;
pub use directory::PeerDirectory;
pub use error::{SessionError, TransferError, TransportError};
pub use handle::{Command, SessionEvent, SessionHandle, SessionSnapshot};
pub use inbox::{FileSlot, Inbox, InboxSlot};
pub use preferences::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences};
pub use registry::PublicKeyRegistry;
pub use telemetry::init_tracing;
pub use transfer::{ResourceTransfers, TransferRecord};
pub use transport::{Transport, TransportEvent};
