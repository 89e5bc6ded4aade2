//! User preferences read at session (re)initialization.
//!
//! The settings layer owns these values; the session only loads them and
//! writes them back when the user edits them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use whisper_protocol::ProfileSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Encoded avatar image.
    #[serde(default)]
    pub avatar: Vec<u8>,

    #[serde(default)]
    pub bio: String,

    /// Whether browsers should surface this node (`{"show": "Yes"}`).
    #[serde(default)]
    pub is_advertising: bool,

    #[serde(default = "default_encryption_enabled")]
    pub is_encryption_enabled: bool,

    #[serde(default)]
    pub is_browsing: bool,
}

fn default_display_name() -> String {
    "Whisper".into()
}

fn default_encryption_enabled() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            avatar: Vec::new(),
            bio: String::new(),
            is_advertising: false,
            is_encryption_enabled: default_encryption_enabled(),
            is_browsing: false,
        }
    }
}

impl Preferences {
    /// The profile sent to peers during the handshake.
    pub fn profile(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            bio: self.bio.clone(),
            is_advertising: self.is_advertising,
        }
    }
}

/// Persistence backend for [`Preferences`].
pub trait PreferenceStore: Send + Sync + 'static {
    fn load(&self) -> anyhow::Result<Preferences>;
    fn save(&self, preferences: &Preferences) -> anyhow::Result<()>;
}

/// Preferences kept in a JSON file. A missing file yields the defaults.
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> anyhow::Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read preferences: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid preferences file: {}", self.path.display()))
    }

    fn save(&self, preferences: &Preferences) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(preferences)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write preferences: {}", self.path.display()))
    }
}

/// In-process store, for shells without durable settings and for tests.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    current: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            current: Mutex::new(preferences),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> anyhow::Result<Preferences> {
        let current = self
            .current
            .lock()
            .map_err(|_| anyhow::anyhow!("preference store poisoned"))?;
        Ok(current.clone())
    }

    fn save(&self, preferences: &Preferences) -> anyhow::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow::anyhow!("preference store poisoned"))?;
        *current = preferences.clone();
        Ok(())
    }
}
