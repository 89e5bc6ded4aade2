use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use whisper_protocol::codec::MAX_ENVELOPE_SIZE;

/// When the local profile is sent after a session connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileExchange {
    /// Right after our public key; sealed only if the peer's key is already known.
    #[default]
    Immediate,
    /// Held back until the peer's key is registered, then sent sealed.
    AwaitPeerKey,
}

/// Session configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Service type advertised and browsed on the mesh.
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Capacity of the coordinator's command mailbox.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Root directory for received files (one subdirectory per peer).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default)]
    pub profile_exchange: ProfileExchange,

    /// Accept unsealed message/image/profile envelopes.
    #[serde(default = "default_accept_plaintext")]
    pub accept_plaintext: bool,

    /// Inbound envelopes above this size are dropped.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
}

fn default_service_type() -> String {
    "find-nearby".into()
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("received")
}

fn default_accept_plaintext() -> bool {
    true
}

fn default_max_envelope_bytes() -> usize {
    MAX_ENVELOPE_SIZE
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            mailbox_capacity: default_mailbox_capacity(),
            storage_dir: default_storage_dir(),
            profile_exchange: ProfileExchange::default(),
            accept_plaintext: default_accept_plaintext(),
            max_envelope_bytes: default_max_envelope_bytes(),
        }
    }
}

impl SessionConfig {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }
}
