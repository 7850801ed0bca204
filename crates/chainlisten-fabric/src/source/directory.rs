//! Replay source that reads serialized blocks from a directory.
//!
//! Files are named `<channel>_<number>.block` and hold one protobuf-encoded
//! `common.Block`, the format `peer channel fetch` writes. Each registration
//! polls for the next expected file and waits when it is not there yet.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use prost::Message;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{BlockEvent, BlockEventStream, BlockSource, Registration};
use crate::error::SourceError;
use crate::proto::Block;

pub struct DirectoryBlockSource {
    dir: PathBuf,
    poll_interval: Duration,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl DirectoryBlockSource {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            next_id: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding block `number` of `channel_id`.
    pub fn block_path(&self, channel_id: &str, number: u64) -> PathBuf {
        self.dir.join(format!("{channel_id}_{number}.block"))
    }
}

impl Drop for DirectoryBlockSource {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

#[async_trait]
impl BlockSource for DirectoryBlockSource {
    async fn register(
        &self,
        channel_id: &str,
        from_block: u64,
    ) -> Result<(Registration, BlockEventStream), SourceError> {
        let meta = tokio::fs::metadata(&self.dir)
            .await
            .map_err(|source| SourceError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;
        if !meta.is_dir() {
            return Err(SourceError::Unavailable {
                channel: channel_id.to_string(),
                reason: format!("{} is not a directory", self.dir.display()),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        let poller = Poller {
            dir: self.dir.clone(),
            channel_id: channel_id.to_string(),
            next: from_block,
            poll_interval: self.poll_interval,
            tx,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(id, tokio::spawn(poller.run()));

        let registration = Registration {
            channel_id: channel_id.to_string(),
            id,
        };
        Ok((registration, rx.boxed()))
    }

    fn unregister(&self, registration: &Registration) {
        if let Some(task) = self.tasks.lock().remove(&registration.id) {
            task.abort();
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

struct Poller {
    dir: PathBuf,
    channel_id: String,
    next: u64,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<BlockEvent>,
}

impl Poller {
    /// Returning drops `tx`, which ends the stream.
    async fn run(mut self) {
        loop {
            if self.tx.is_closed() {
                return;
            }
            let path = self.dir.join(format!("{}_{}.block", self.channel_id, self.next));
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "cannot read block file");
                    return;
                }
            };

            let block = match Block::decode(bytes.as_slice()) {
                Ok(block) => block,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "cannot decode block file");
                    return;
                }
            };
            if block.number() != Some(self.next) {
                tracing::warn!(
                    path = %path.display(),
                    expected = self.next,
                    found = ?block.number(),
                    "block file number does not match its name"
                );
            }

            tracing::trace!(channel = %self.channel_id, block = self.next, "read block file");
            if self.tx.unbounded_send(BlockEvent::new(block)).is_err() {
                return;
            }
            self.next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::BlockFixture;

    #[tokio::test]
    async fn reads_consecutive_files_from_start_height() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryBlockSource::new(dir.path(), Duration::from_millis(10));
        for n in 4..7 {
            std::fs::write(source.block_path("ch", n), BlockFixture::new(n).encode()).unwrap();
        }

        let (_reg, stream) = source.register("ch", 5).await.unwrap();
        let numbers: Vec<_> = stream
            .take(2)
            .map(|ev| ev.block.and_then(|b| b.number()))
            .collect()
            .await;
        assert_eq!(numbers, vec![Some(5), Some(6)]);
    }

    #[tokio::test]
    async fn waits_for_file_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryBlockSource::new(dir.path(), Duration::from_millis(10));
        let (_reg, mut stream) = source.register("ch", 0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(source.block_path("ch", 0), BlockFixture::new(0).encode()).unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.block.unwrap().number(), Some(0));
    }

    #[tokio::test]
    async fn corrupt_file_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryBlockSource::new(dir.path(), Duration::from_millis(10));
        std::fs::write(source.block_path("ch", 0), [0xff, 0xff, 0xff]).unwrap();

        let (_reg, mut stream) = source.register("ch", 0).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn missing_directory_fails_registration() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryBlockSource::new(dir.path().join("nope"), Duration::from_millis(10));
        assert!(matches!(
            source.register("ch", 0).await,
            Err(SourceError::Io { .. })
        ));
    }
}
