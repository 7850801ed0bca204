//! Checkpoint scheduler. Flushes the checkpoint store on a fixed interval.
//!
//! Listeners only touch the in-memory store, so a slow flush never holds up
//! block processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::checkpoint::{CheckpointRecord, CheckpointStorage, CheckpointStore};
use crate::config::MIN_RECORD_SECONDS;
use crate::error::{CheckpointError, ConfigError};
use crate::shutdown::ShutdownSignal;

pub struct CheckpointScheduler {
    store: Arc<CheckpointStore>,
    storage: Arc<dyn CheckpointStorage>,
    interval: Duration,
}

impl CheckpointScheduler {
    pub fn new(
        store: Arc<CheckpointStore>,
        storage: Arc<dyn CheckpointStorage>,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        if interval < Duration::from_secs(MIN_RECORD_SECONDS) {
            return Err(ConfigError::RecordIntervalTooSmall {
                min: MIN_RECORD_SECONDS,
                got: interval.as_secs(),
            });
        }
        Ok(Self {
            store,
            storage,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot the store and persist it once.
    pub async fn tick(&self) -> Result<CheckpointRecord, CheckpointError> {
        let record = self.store.flush(self.storage.as_ref()).await?;
        tracing::info!(
            target = %self.storage.location(),
            heights = ?record.to_map(),
            "recorded channel block heights"
        );
        Ok(record)
    }

    /// Flush every interval until shutdown, then flush one last time.
    ///
    /// Flush failures are logged and retried on the next tick.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "checkpoint scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "checkpoint flush failed; keeping in-memory state");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        match self.tick().await {
            Ok(_) => tracing::info!("final checkpoint flushed"),
            Err(e) => tracing::error!(error = %e, "final checkpoint flush failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStorage;
    use crate::config::ListenChannel;
    use crate::shutdown::shutdown_channel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store() -> Arc<CheckpointStore> {
        Arc::new(CheckpointStore::load(&[ListenChannel::new("a", 0)], None))
    }

    #[test]
    fn interval_below_minimum_rejected() {
        let storage = Arc::new(MemoryCheckpointStorage::new());
        let res = CheckpointScheduler::new(store(), storage, Duration::from_secs(2));
        assert!(matches!(res, Err(ConfigError::RecordIntervalTooSmall { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_each_tick_and_on_shutdown() {
        let store = store();
        let storage = Arc::new(MemoryCheckpointStorage::new());
        let scheduler =
            CheckpointScheduler::new(Arc::clone(&store), storage.clone(), Duration::from_secs(3))
                .unwrap();
        let (trigger, signal) = shutdown_channel();
        let handle = tokio::spawn(scheduler.run(signal));

        store.update("a", 5).unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(storage.save_count(), 1);
        assert_eq!(storage.current().unwrap().get("a"), Some(5));

        store.update("a", 9).unwrap();
        trigger.trigger();
        handle.await.unwrap();
        assert_eq!(storage.save_count(), 2);
        assert_eq!(storage.current().unwrap().get("a"), Some(9));
    }

    struct FailingStorage(AtomicU32);

    #[async_trait]
    impl CheckpointStorage for FailingStorage {
        async fn load(&self) -> Result<Option<CheckpointRecord>, CheckpointError> {
            Ok(None)
        }
        async fn save(&self, _r: &CheckpointRecord) -> Result<(), CheckpointError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Err(CheckpointError::Storage("disk full".into()))
        }
        fn location(&self) -> String {
            "failing".into()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flush_failure_keeps_running() {
        let storage = Arc::new(FailingStorage(AtomicU32::new(0)));
        let scheduler =
            CheckpointScheduler::new(store(), storage.clone(), Duration::from_secs(3)).unwrap();
        let (trigger, signal) = shutdown_channel();
        let handle = tokio::spawn(scheduler.run(signal));

        tokio::time::sleep(Duration::from_millis(9_100)).await;
        assert_eq!(storage.0.load(Ordering::Relaxed), 3);

        trigger.trigger();
        handle.await.unwrap();
        assert_eq!(storage.0.load(Ordering::Relaxed), 4);
    }
}
