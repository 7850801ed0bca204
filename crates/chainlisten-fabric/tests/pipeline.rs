//! End-to-end pipeline tests: supervisor, listeners, extractor, publisher
//! and YAML checkpoint file working together over an in-process source.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chainlisten_core::checkpoint::{CheckpointEntry, CheckpointRecord, CheckpointStorage};
use chainlisten_core::config::Configuration;
use chainlisten_core::error::PublishError;
use chainlisten_core::publish::Publisher;
use chainlisten_core::shutdown::shutdown_channel;
use chainlisten_core::types::BlockWrites;
use chainlisten_fabric::fixture::{ActionFixture, BlockFixture, TxFixture, MVCC_READ_CONFLICT};
use chainlisten_fabric::{Block, ChannelBlockSource, ListenerError, Supervisor, SupervisorHandle};
use chainlisten_storage::YamlFileStorage;

// ─── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CollectingPublisher {
    blocks: Mutex<Vec<BlockWrites>>,
}

#[async_trait]
impl Publisher for CollectingPublisher {
    async fn publish(&self, _method: &str, writes: &BlockWrites) -> Result<(), PublishError> {
        self.blocks.lock().push(writes.clone());
        Ok(())
    }
}

impl CollectingPublisher {
    fn block_numbers(&self, channel: &str) -> Vec<u64> {
        self.blocks
            .lock()
            .iter()
            .filter(|w| w.channel_id == channel)
            .map(|w| w.block_number)
            .collect()
    }
}

fn config(data_path: &Path, channels: &[(&str, u64)]) -> Configuration {
    let mut yaml = format!(
        "crypto:\n  network-yaml-path: ./network.yaml\nrecord:\n  seconds: 3\n  data-path: {}\nlisten-channels:\n",
        data_path.display()
    );
    for (id, from) in channels {
        yaml.push_str(&format!("  - id: {id}\n    from: {from}\n"));
    }
    Configuration::from_yaml_str(&yaml).unwrap()
}

fn app_block(n: u64) -> Block {
    BlockFixture::new(n)
        .tx(TxFixture::endorser(format!("tx-{n}"))
            .action(ActionFixture::new("app", &["put", "k", "v"]).write("app", "k", "v")))
        .build()
}

struct Harness {
    source: Arc<ChannelBlockSource>,
    publisher: Arc<CollectingPublisher>,
    storage: Arc<YamlFileStorage>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            source: Arc::new(ChannelBlockSource::new()),
            publisher: Arc::new(CollectingPublisher::default()),
            storage: Arc::new(YamlFileStorage::new(dir.path().join("record.yaml"))),
            _dir: dir,
        }
    }

    async fn start(
        &self,
        channels: &[(&str, u64)],
    ) -> (chainlisten_core::ShutdownTrigger, SupervisorHandle) {
        let cfg = config(self.storage.path(), channels);
        let (trigger, signal) = shutdown_channel();
        let handle = Supervisor::new(
            cfg,
            self.source.clone(),
            self.storage.clone(),
            self.publisher.clone(),
        )
        .start(signal)
        .await
        .unwrap();
        (trigger, handle)
    }
}

async fn wait_for_cursor(handle: &SupervisorHandle, channel: &str, want: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.store().cursor(channel) != Some(want) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{channel} never reached {want}"));
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn contiguous_blocks_are_checkpointed_on_shutdown() {
    let h = Harness::new();
    let (trigger, handle) = h.start(&[("mychannel", 0)]).await;

    for n in 1..=4 {
        h.source.send_block("mychannel", app_block(n));
    }
    wait_for_cursor(&handle, "mychannel", 4).await;

    trigger.trigger();
    let exits = handle.join().await;
    assert!(exits.iter().all(|x| x.result.is_ok()));

    assert_eq!(h.publisher.block_numbers("mychannel"), vec![1, 2, 3, 4]);
    let persisted = h.storage.load().await.unwrap().unwrap();
    assert_eq!(persisted.get("mychannel"), Some(4));
}

#[tokio::test]
async fn empty_block_still_advances_cursor() {
    let h = Harness::new();
    let (trigger, handle) = h.start(&[("mychannel", 0)]).await;

    h.source.send_block("mychannel", BlockFixture::new(1).build());
    wait_for_cursor(&handle, "mychannel", 1).await;

    trigger.trigger();
    handle.join().await;
    assert!(h.publisher.block_numbers("mychannel").is_empty());
}

#[tokio::test]
async fn invalid_and_system_writes_never_reach_the_publisher() {
    let h = Harness::new();
    let (trigger, handle) = h.start(&[("mychannel", 41)]).await;

    let block = BlockFixture::new(42)
        .tx(TxFixture::endorser("t0")
            .action(ActionFixture::new("app", &["put", "a", "1"]).write("app", "a", "1")))
        .invalid_tx(
            TxFixture::endorser("t1")
                .action(ActionFixture::new("app", &["put", "b", "2"]).write("app", "b", "2")),
            MVCC_READ_CONFLICT,
        )
        .tx(TxFixture::endorser("t2").action(
            ActionFixture::new("lscc", &["deploy"])
                .write("lscc", "mycc", "def")
                .write("app", "c", "3"),
        ))
        .build();
    h.source.send_block("mychannel", block);
    wait_for_cursor(&handle, "mychannel", 42).await;

    trigger.trigger();
    handle.join().await;

    let blocks = h.publisher.blocks.lock();
    assert_eq!(blocks.len(), 1);
    let keys: Vec<_> = blocks[0]
        .records
        .iter()
        .map(|r| (r.tx_index, r.namespace.as_str(), r.key.as_str()))
        .collect();
    assert_eq!(keys, vec![(0, "app", "a"), (2, "app", "c")]);
}

#[tokio::test]
async fn resumes_after_persisted_height() {
    let h = Harness::new();
    h.storage
        .save(&CheckpointRecord::new(vec![CheckpointEntry {
            id: "mychannel".into(),
            block_number: 25,
        }]))
        .await
        .unwrap();
    for n in 20..=27 {
        h.source.send_block("mychannel", app_block(n));
    }

    let (trigger, handle) = h.start(&[("mychannel", 10)]).await;
    assert_eq!(handle.store().cursor("mychannel"), Some(25));
    wait_for_cursor(&handle, "mychannel", 27).await;

    trigger.trigger();
    handle.join().await;
    assert_eq!(h.publisher.block_numbers("mychannel"), vec![26, 27]);
}

#[tokio::test]
async fn closed_stream_only_stops_its_own_channel() {
    let h = Harness::new();
    let (trigger, handle) = h.start(&[("a", 0), ("b", 0)]).await;

    while h.source.registrations("a") == 0 || h.source.registrations("b") == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.source.close("a");
    let mut a_state = handle.watch_state("a").unwrap();
    a_state
        .wait_for(|s| *s == chainlisten_fabric::ListenerState::Closed)
        .await
        .unwrap();

    h.source.send_block("b", app_block(1));
    wait_for_cursor(&handle, "b", 1).await;

    trigger.trigger();
    let exits = handle.join().await;
    let a = exits.iter().find(|x| x.channel_id == "a").unwrap();
    let b = exits.iter().find(|x| x.channel_id == "b").unwrap();
    assert!(matches!(a.result, Err(ListenerError::StreamClosed { .. })));
    assert!(b.result.is_ok());
}

#[tokio::test]
async fn registration_failure_only_stops_its_own_channel() {
    let h = Harness::new();
    h.source.reject("a", "channel does not exist");
    let (trigger, handle) = h.start(&[("a", 0), ("b", 0)]).await;

    h.source.send_block("b", app_block(1));
    wait_for_cursor(&handle, "b", 1).await;

    trigger.trigger();
    let exits = handle.join().await;
    let a = exits.iter().find(|x| x.channel_id == "a").unwrap();
    assert!(matches!(a.result, Err(ListenerError::Register { .. })));
}

#[tokio::test]
async fn empty_event_is_logged_and_skipped() {
    let h = Harness::new();
    let (trigger, handle) = h.start(&[("mychannel", 0)]).await;

    while h.source.registrations("mychannel") == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.source.send_empty("mychannel");
    h.source.send_block("mychannel", app_block(1));
    wait_for_cursor(&handle, "mychannel", 1).await;

    trigger.trigger();
    let exits = handle.join().await;
    assert!(exits[0].result.is_ok());
}

#[tokio::test]
async fn supervisor_rejects_short_record_interval() {
    let h = Harness::new();
    let mut cfg = config(h.storage.path(), &[("mychannel", 0)]);
    cfg.record.seconds = 1;
    let (_trigger, signal) = shutdown_channel();
    let res = Supervisor::new(cfg, h.source.clone(), h.storage.clone(), h.publisher.clone())
        .start(signal)
        .await;
    assert!(res.is_err());
}
