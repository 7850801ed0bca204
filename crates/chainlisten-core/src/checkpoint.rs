//! Checkpoint store: the authoritative per-channel cursor map.
//!
//! The store is built once at startup by merging configured start heights with
//! the persisted checkpoint, then updated in place by the channel listeners.
//! The scheduler periodically takes a [`CheckpointRecord`] snapshot and hands
//! it to a [`CheckpointStorage`] backend, which replaces the persisted
//! document in full.
//!
//! Between flushes the in-memory map is the source of truth; a crash loses at
//! most one flush interval of progress, which the stream re-delivers.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ListenChannel;
use crate::cursor::ChannelCursor;
use crate::error::CheckpointError;

/// One persisted `{id, from}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub id: String,
    #[serde(rename = "from")]
    pub block_number: u64,
}

/// A point-in-time copy of every channel cursor, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointRecord {
    entries: Vec<CheckpointEntry>,
}

impl CheckpointRecord {
    pub fn new(entries: Vec<CheckpointEntry>) -> Self {
        Self { entries }
    }

    /// Persisted height for `channel_id`. If a channel appears more than
    /// once, the highest height wins.
    pub fn get(&self, channel_id: &str) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.id == channel_id)
            .map(|e| e.block_number)
            .max()
    }

    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// channel id → height
    pub fn to_map(&self) -> HashMap<String, u64> {
        let mut map = HashMap::new();
        for entry in &self.entries {
            let slot = map.entry(entry.id.clone()).or_insert(entry.block_number);
            *slot = (*slot).max(entry.block_number);
        }
        map
    }
}

/// Durable storage for checkpoint records.
///
/// Implementations include [`MemoryCheckpointStorage`] and the YAML file
/// backend in `chainlisten-storage`.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Load the persisted record; `Ok(None)` means nothing was persisted yet.
    async fn load(&self) -> Result<Option<CheckpointRecord>, CheckpointError>;

    /// Replace the persisted record with `record`.
    async fn save(&self, record: &CheckpointRecord) -> Result<(), CheckpointError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

/// In-memory cursor map shared by all listeners and the scheduler.
///
/// A single mutex guards the whole map so that [`snapshot`](Self::snapshot)
/// never observes a half-applied update. The id → slot index is fixed at load
/// time and read without locking.
#[derive(Debug)]
pub struct CheckpointStore {
    cursors: Mutex<Vec<ChannelCursor>>,
    index: HashMap<String, usize>,
}

impl CheckpointStore {
    /// Merge configured channels with the persisted record.
    ///
    /// Effective cursor is `max(configured, persisted)`; persisted channels
    /// that are no longer configured are dropped.
    pub fn load(configured: &[ListenChannel], persisted: Option<&CheckpointRecord>) -> Self {
        let persisted = persisted.map(CheckpointRecord::to_map).unwrap_or_default();

        let mut cursors = Vec::with_capacity(configured.len());
        let mut index = HashMap::with_capacity(configured.len());
        for channel in configured {
            let mut cursor = ChannelCursor::new(&channel.id, channel.from_block);
            if let Some(&height) = persisted.get(&channel.id) {
                cursor.merge(height);
                tracing::info!(
                    channel = %channel.id,
                    configured = channel.from_block,
                    persisted = height,
                    effective = cursor.block_number,
                    "merged checkpoint"
                );
            }
            index.insert(channel.id.clone(), cursors.len());
            cursors.push(cursor);
        }

        for id in persisted.keys().filter(|id| !index.contains_key(*id)) {
            tracing::debug!(channel = %id, "discarding checkpoint for unconfigured channel");
        }

        Self {
            cursors: Mutex::new(cursors),
            index,
        }
    }

    /// Record that `block_number` has been fully processed on `channel_id`.
    ///
    /// A height behind the current cursor is ignored with a warning.
    pub fn update(&self, channel_id: &str, block_number: u64) -> Result<(), CheckpointError> {
        let slot = *self
            .index
            .get(channel_id)
            .ok_or_else(|| CheckpointError::UnknownChannel(channel_id.to_string()))?;

        let mut cursors = self.cursors.lock();
        let cursor = &mut cursors[slot];
        if !cursor.advance(block_number) {
            tracing::warn!(
                channel = %channel_id,
                current = cursor.block_number,
                block = block_number,
                "ignoring cursor regression"
            );
        }
        Ok(())
    }

    /// Current cursor for `channel_id`.
    pub fn cursor(&self, channel_id: &str) -> Option<u64> {
        let slot = *self.index.get(channel_id)?;
        Some(self.cursors.lock()[slot].block_number)
    }

    /// Height to subscribe from for `channel_id` (cursor + 1).
    pub fn next_block(&self, channel_id: &str) -> Option<u64> {
        let slot = *self.index.get(channel_id)?;
        Some(self.cursors.lock()[slot].next_block())
    }

    /// Consistent copy of all cursors.
    pub fn snapshot(&self) -> CheckpointRecord {
        let cursors = self.cursors.lock();
        CheckpointRecord::new(
            cursors
                .iter()
                .map(|c| CheckpointEntry {
                    id: c.channel_id.clone(),
                    block_number: c.block_number,
                })
                .collect(),
        )
    }

    /// Snapshot and persist. The lock is released before storage IO starts.
    pub async fn flush(
        &self,
        storage: &dyn CheckpointStorage,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let record = self.snapshot();
        storage.save(&record).await?;
        Ok(record)
    }

    /// Configured channel ids, in configuration order.
    pub fn channels(&self) -> Vec<String> {
        self.cursors.lock().iter().map(|c| c.channel_id.clone()).collect()
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.index.contains_key(channel_id)
    }
}

// ─── In-memory storage (for testing) ─────────────────────────────────────────

/// In-memory checkpoint storage for tests and ephemeral listeners.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStorage {
    record: Mutex<Option<CheckpointRecord>>,
    saves: Mutex<u64>,
}

impl MemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CheckpointRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: Mutex::new(0),
        }
    }

    /// The last saved record.
    pub fn current(&self) -> Option<CheckpointRecord> {
        self.record.lock().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

#[async_trait]
impl CheckpointStorage for MemoryCheckpointStorage {
    async fn load(&self) -> Result<Option<CheckpointRecord>, CheckpointError> {
        Ok(self.record.lock().clone())
    }

    async fn save(&self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        *self.record.lock() = Some(record.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(specs: &[(&str, u64)]) -> Vec<ListenChannel> {
        specs.iter().map(|(id, from)| ListenChannel::new(*id, *from)).collect()
    }

    fn record(specs: &[(&str, u64)]) -> CheckpointRecord {
        CheckpointRecord::new(
            specs
                .iter()
                .map(|(id, n)| CheckpointEntry { id: id.to_string(), block_number: *n })
                .collect(),
        )
    }

    #[test]
    fn merge_takes_max_of_configured_and_persisted() {
        let store = CheckpointStore::load(
            &channels(&[("chan1", 10), ("chan2", 50), ("chan3", 5)]),
            Some(&record(&[("chan1", 25), ("chan2", 40)])),
        );
        assert_eq!(store.cursor("chan1"), Some(25));
        assert_eq!(store.cursor("chan2"), Some(50));
        assert_eq!(store.cursor("chan3"), Some(5));
    }

    #[test]
    fn resume_starts_after_persisted_height() {
        let store = CheckpointStore::load(
            &channels(&[("chan1", 10)]),
            Some(&record(&[("chan1", 25)])),
        );
        assert_eq!(store.next_block("chan1"), Some(26));
    }

    #[test]
    fn merge_is_idempotent() {
        let configured = channels(&[("a", 3), ("b", 9)]);
        let persisted = record(&[("a", 7), ("b", 1)]);
        let once = CheckpointStore::load(&configured, Some(&persisted)).snapshot();
        let twice = CheckpointStore::load(&configured, Some(&once)).snapshot();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_persisted_channels_are_dropped() {
        let store = CheckpointStore::load(
            &channels(&[("a", 1)]),
            Some(&record(&[("a", 2), ("gone", 99)])),
        );
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("gone"), None);
        assert!(!store.contains("gone"));
    }

    #[test]
    fn no_persisted_record_uses_configured() {
        let store = CheckpointStore::load(&channels(&[("a", 4)]), None);
        assert_eq!(store.cursor("a"), Some(4));
    }

    #[test]
    fn update_unknown_channel_fails() {
        let store = CheckpointStore::load(&channels(&[("a", 0)]), None);
        let err = store.update("b", 1).unwrap_err();
        assert!(err.is_unknown_channel());
    }

    #[test]
    fn contiguous_updates_advance_cursor() {
        let store = CheckpointStore::load(&channels(&[("a", 100)]), None);
        for n in 101..=110 {
            store.update("a", n).unwrap();
        }
        assert_eq!(store.cursor("a"), Some(110));
        store.update("a", 105).unwrap();
        assert_eq!(store.cursor("a"), Some(110));
    }

    #[test]
    fn concurrent_updates_are_isolated_per_channel() {
        use std::sync::Arc;
        let store = Arc::new(CheckpointStore::load(&channels(&[("a", 0), ("b", 0)]), None));
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 1..=1000 {
                        store.update(id, n).unwrap();
                        let snap = store.snapshot();
                        assert_eq!(snap.len(), 2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.cursor("a"), Some(1000));
        assert_eq!(store.cursor("b"), Some(1000));
    }

    #[tokio::test]
    async fn flush_then_load_roundtrip() {
        let configured = channels(&[("a", 1), ("b", 2)]);
        let store = CheckpointStore::load(&configured, None);
        store.update("a", 17).unwrap();

        let storage = MemoryCheckpointStorage::new();
        let written = store.flush(&storage).await.unwrap();
        assert_eq!(storage.save_count(), 1);

        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded, written);
        let restored = CheckpointStore::load(&configured, Some(&loaded));
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
