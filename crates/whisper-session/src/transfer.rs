//! Incoming file transfers.
//!
//! The transport stages a received resource in temporary storage; once it
//! reports completion we copy it into `<storage_dir>/<peer-id>/<file name>`.
//! A transfer is always marked finished, whether or not the copy succeeded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use whisper_protocol::PeerId;

use crate::error::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub peer: PeerId,
    pub name: String,
    pub temp_location: Option<PathBuf>,
    pub final_location: Option<PathBuf>,
    pub finished: bool,
}

#[derive(Debug)]
pub struct ResourceTransfers {
    storage_dir: PathBuf,
    records: HashMap<(PeerId, String), TransferRecord>,
}

impl ResourceTransfers {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            records: HashMap::new(),
        }
    }

    /// Note that a peer started sending `name`.
    pub fn begin_receiving(&mut self, peer: PeerId, name: &str) -> &TransferRecord {
        info!(%peer, file = name, "started receiving resource");
        let record = TransferRecord {
            peer,
            name: name.to_string(),
            temp_location: None,
            final_location: None,
            finished: false,
        };
        self.records.insert((peer, name.to_string()), record);
        &self.records[&(peer, name.to_string())]
    }

    /// Move a finished resource into durable storage.
    ///
    /// `transport_error` is the failure reported by the transport, if any.
    /// On failure no artifact is left behind, but the record is still
    /// marked finished.
    pub async fn complete_receiving(
        &mut self,
        peer: PeerId,
        name: &str,
        temp_location: Option<&Path>,
        transport_error: Option<&str>,
    ) -> Result<PathBuf, TransferError> {
        let result = self.relocate(peer, name, temp_location, transport_error).await;

        let record = self
            .records
            .entry((peer, name.to_string()))
            .or_insert_with(|| TransferRecord {
                peer,
                name: name.to_string(),
                temp_location: None,
                final_location: None,
                finished: false,
            });
        record.temp_location = temp_location.map(Path::to_path_buf);
        record.final_location = result.as_ref().ok().cloned();
        record.finished = true;

        match &result {
            Ok(path) => info!(%peer, file = name, path = %path.display(), "resource stored"),
            Err(e) => warn!(%peer, file = name, "resource transfer failed: {}", e),
        }
        result
    }

    async fn relocate(
        &self,
        peer: PeerId,
        name: &str,
        temp_location: Option<&Path>,
        transport_error: Option<&str>,
    ) -> Result<PathBuf, TransferError> {
        if let Some(reason) = transport_error {
            return Err(TransferError::Transport(reason.to_string()));
        }
        let source = temp_location.ok_or(TransferError::MissingTemporaryFile)?;
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| TransferError::InvalidName(name.to_string()))?;

        let peer_dir = self.storage_dir.join(peer.to_string());
        let destination = peer_dir.join(file_name);

        let copied = async {
            tokio::fs::create_dir_all(&peer_dir).await?;
            tokio::fs::copy(source, &destination).await
        }
        .await;

        match copied {
            Ok(_) => Ok(destination),
            Err(source) => {
                // A partially written copy must not be mistaken for a result.
                let _ = tokio::fs::remove_file(&destination).await;
                Err(TransferError::Copy { source })
            }
        }
    }

    pub fn record(&self, peer: &PeerId, name: &str) -> Option<&TransferRecord> {
        self.records.get(&(*peer, name.to_string()))
    }

    /// Hand a finished record to its consumer.
    pub fn take_finished(&mut self, peer: &PeerId, name: &str) -> Option<TransferRecord> {
        let key = (*peer, name.to_string());
        if self.records.get(&key).is_some_and(|r| r.finished) {
            self.records.remove(&key)
        } else {
            None
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_transfer_is_copied() {
        let storage = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let temp = staging.path().join("upload.tmp");
        std::fs::write(&temp, b"file body").unwrap();

        let mut transfers = ResourceTransfers::new(storage.path());
        let peer = PeerId::random();
        let record = transfers.begin_receiving(peer, "notes.txt");
        assert!(!record.finished);

        let path = transfers
            .complete_receiving(peer, "notes.txt", Some(temp.as_path()), None)
            .await
            .unwrap();
        assert_eq!(path, storage.path().join(peer.to_string()).join("notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"file body");

        let record = transfers.record(&peer, "notes.txt").unwrap();
        assert!(record.finished);
        assert_eq!(record.final_location.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn copy_failure_still_finishes_without_artifact() {
        let storage = tempfile::tempdir().unwrap();
        let mut transfers = ResourceTransfers::new(storage.path());
        let peer = PeerId::random();
        transfers.begin_receiving(peer, "photo.png");

        let missing = storage.path().join("does-not-exist.tmp");
        let result = transfers
            .complete_receiving(peer, "photo.png", Some(missing.as_path()), None)
            .await;
        assert!(matches!(result, Err(TransferError::Copy { .. })));

        let record = transfers.record(&peer, "photo.png").unwrap();
        assert!(record.finished);
        assert!(record.final_location.is_none());
        assert!(!storage.path().join(peer.to_string()).join("photo.png").exists());
    }

    #[tokio::test]
    async fn transport_error_finishes_without_artifact() {
        let storage = tempfile::tempdir().unwrap();
        let mut transfers = ResourceTransfers::new(storage.path());
        let peer = PeerId::random();
        let result = transfers
            .complete_receiving(peer, "a.bin", None, Some("peer went away"))
            .await;
        assert!(matches!(result, Err(TransferError::Transport(ref r)) if r == "peer went away"));
        assert!(transfers.record(&peer, "a.bin").unwrap().finished);
    }

    #[tokio::test]
    async fn missing_temp_location_is_failure() {
        let storage = tempfile::tempdir().unwrap();
        let mut transfers = ResourceTransfers::new(storage.path());
        let result = transfers
            .complete_receiving(PeerId::random(), "a.bin", None, None)
            .await;
        assert!(matches!(result, Err(TransferError::MissingTemporaryFile)));
    }

    #[tokio::test]
    async fn path_components_are_stripped() {
        let storage = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let temp = staging.path().join("x.tmp");
        std::fs::write(&temp, b"x").unwrap();

        let mut transfers = ResourceTransfers::new(storage.path());
        let peer = PeerId::random();
        let path = transfers
            .complete_receiving(peer, "../../etc/passwd", Some(temp.as_path()), None)
            .await
            .unwrap();
        assert_eq!(path, storage.path().join(peer.to_string()).join("passwd"));

        let result = transfers.complete_receiving(peer, "..", Some(temp.as_path()), None).await;
        assert!(matches!(result, Err(TransferError::InvalidName(_))));
    }

    #[tokio::test]
    async fn take_finished_only_returns_finished() {
        let storage = tempfile::tempdir().unwrap();
        let mut transfers = ResourceTransfers::new(storage.path());
        let peer = PeerId::random();
        transfers.begin_receiving(peer, "pending.txt");
        assert!(transfers.take_finished(&peer, "pending.txt").is_none());

        let _ = transfers.complete_receiving(peer, "pending.txt", None, None).await;
        let record = transfers.take_finished(&peer, "pending.txt").unwrap();
        assert!(record.finished);
        assert!(transfers.record(&peer, "pending.txt").is_none());
    }
}
