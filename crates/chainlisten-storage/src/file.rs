//! YAML file checkpoint storage.
//!
//! The persisted document is a YAML sequence of `{id, from}` records:
//!
//! ```yaml
//! - id: mychannel
//!   from: 1042
//! - id: audit
//!   from: 77
//! ```
//!
//! Saves write a temporary file next to the target and rename it over the
//! target, so readers only ever see a complete document.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use chainlisten_core::checkpoint::{CheckpointRecord, CheckpointStorage};
use chainlisten_core::error::CheckpointError;

/// Checkpoint storage backed by a single YAML file.
#[derive(Debug, Clone)]
pub struct YamlFileStorage {
    path: PathBuf,
}

impl YamlFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStorage for YamlFileStorage {
    async fn load(&self) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "no checkpoint file; starting from configured heights"
                );
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(e)),
        };

        if data.trim().is_empty() {
            return Ok(Some(CheckpointRecord::default()));
        }
        let record: CheckpointRecord = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %self.path.display(), channels = record.len(), "loaded checkpoint");
        Ok(Some(record))
    }

    async fn save(&self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        let body = serde_yaml::to_string(record)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&path, body.as_bytes()))
            .await
            .map_err(|e| CheckpointError::Storage(format!("checkpoint writer task failed: {e}")))?
            .map_err(|e| self.io_err(e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn replace_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlisten_core::checkpoint::{CheckpointEntry, CheckpointStore};
    use chainlisten_core::config::ListenChannel;

    fn entry(id: &str, n: u64) -> CheckpointEntry {
        CheckpointEntry { id: id.into(), block_number: n }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = YamlFileStorage::new(dir.path().join("record.yaml"));
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = YamlFileStorage::new(dir.path().join("data").join("record.yaml"));

        let record = CheckpointRecord::new(vec![entry("mychannel", 1042), entry("audit", 77)]);
        storage.save(&record).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn save_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let storage = YamlFileStorage::new(dir.path().join("record.yaml"));

        storage
            .save(&CheckpointRecord::new(vec![entry("a", 1), entry("b", 2), entry("c", 3)]))
            .await
            .unwrap();
        let smaller = CheckpointRecord::new(vec![entry("a", 9)]);
        storage.save(&smaller).await.unwrap();

        assert_eq!(storage.load().await.unwrap(), Some(smaller));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files must not be left behind");
    }

    #[tokio::test]
    async fn reads_documents_with_extra_channel_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.yaml");
        std::fs::write(
            &path,
            "- id: chan1\n  org: Org1\n  user: User1\n  from: 25\n",
        )
        .unwrap();

        let loaded = YamlFileStorage::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.get("chan1"), Some(25));

        let store = CheckpointStore::load(&[ListenChannel::new("chan1", 10)], Some(&loaded));
        assert_eq!(store.next_block("chan1"), Some(26));
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.yaml");
        std::fs::write(&path, "id: [not, a, list").unwrap();
        let err = YamlFileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serde(_)));
    }

    #[tokio::test]
    async fn store_flush_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = YamlFileStorage::new(dir.path().join("record.yaml"));
        let configured = vec![ListenChannel::new("a", 3), ListenChannel::new("b", 0)];

        let store = CheckpointStore::load(&configured, None);
        store.update("b", 12).unwrap();
        store.flush(&storage).await.unwrap();

        let loaded = storage.load().await.unwrap();
        let restored = CheckpointStore::load(&configured, loaded.as_ref());
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
