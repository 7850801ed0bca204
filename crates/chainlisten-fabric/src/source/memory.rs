//! In-process block source fed by the caller.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{BlockEvent, BlockEventStream, BlockSource, Registration};
use crate::error::SourceError;
use crate::proto::Block;

/// Block source driven by [`send_block`](Self::send_block).
///
/// Blocks are kept per channel, so a registration replays every recorded
/// block at or above its starting height before receiving live ones. Useful
/// for embedding the listener behind another transport and for tests.
#[derive(Default)]
pub struct ChannelBlockSource {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    history: HashMap<String, Vec<Block>>,
    subscribers: HashMap<u64, Subscriber>,
    rejected: HashMap<String, String>,
}

struct Subscriber {
    channel_id: String,
    tx: mpsc::UnboundedSender<BlockEvent>,
}

impl ChannelBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `block` for `channel_id` and deliver it to live registrations.
    pub fn send_block(&self, channel_id: &str, block: Block) {
        let mut inner = self.inner.lock();
        inner.broadcast(channel_id, BlockEvent::new(block.clone()));
        inner
            .history
            .entry(channel_id.to_string())
            .or_default()
            .push(block);
    }

    /// Deliver an event without a block. Not recorded.
    pub fn send_empty(&self, channel_id: &str) {
        self.inner.lock().broadcast(channel_id, BlockEvent::empty());
    }

    /// End every live stream on `channel_id`. Recorded blocks are kept.
    pub fn close(&self, channel_id: &str) {
        self.inner
            .lock()
            .subscribers
            .retain(|_, sub| sub.channel_id != channel_id);
    }

    /// Make future registrations on `channel_id` fail with `reason`.
    pub fn reject(&self, channel_id: &str, reason: impl Into<String>) {
        self.inner
            .lock()
            .rejected
            .insert(channel_id.to_string(), reason.into());
    }

    /// Number of live registrations on `channel_id`.
    pub fn registrations(&self, channel_id: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .values()
            .filter(|sub| sub.channel_id == channel_id && !sub.tx.is_closed())
            .count()
    }
}

impl Inner {
    fn broadcast(&mut self, channel_id: &str, event: BlockEvent) {
        self.subscribers.retain(|_, sub| {
            sub.channel_id != channel_id || sub.tx.unbounded_send(event.clone()).is_ok()
        });
    }
}

#[async_trait]
impl BlockSource for ChannelBlockSource {
    async fn register(
        &self,
        channel_id: &str,
        from_block: u64,
    ) -> Result<(Registration, BlockEventStream), SourceError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = inner.rejected.get(channel_id) {
            return Err(SourceError::Unavailable {
                channel: channel_id.to_string(),
                reason: reason.clone(),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        let replay = inner
            .history
            .get(channel_id)
            .into_iter()
            .flatten()
            .filter(|b| b.number().is_some_and(|n| n >= from_block));
        for block in replay {
            // receiver is held below, cannot fail
            let _ = tx.unbounded_send(BlockEvent::new(block.clone()));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                channel_id: channel_id.to_string(),
                tx,
            },
        );

        let registration = Registration {
            channel_id: channel_id.to_string(),
            id,
        };
        Ok((registration, rx.boxed()))
    }

    fn unregister(&self, registration: &Registration) {
        self.inner.lock().subscribers.remove(&registration.id);
    }

    fn describe(&self) -> String {
        "in-process".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::BlockFixture;

    #[tokio::test]
    async fn replays_history_from_requested_height() {
        let source = ChannelBlockSource::new();
        for n in 0..5 {
            source.send_block("ch", BlockFixture::new(n).build());
        }

        let (_reg, stream) = source.register("ch", 3).await.unwrap();
        source.close("ch");
        let numbers: Vec<_> = stream
            .map(|ev| ev.block.and_then(|b| b.number()))
            .collect()
            .await;
        assert_eq!(numbers, vec![Some(3), Some(4)]);
    }

    #[tokio::test]
    async fn live_blocks_reach_only_their_channel() {
        let source = ChannelBlockSource::new();
        let (_a, mut a) = source.register("a", 0).await.unwrap();
        let (_b, mut b) = source.register("b", 0).await.unwrap();

        source.send_block("a", BlockFixture::new(0).build());
        source.send_empty("b");

        assert_eq!(a.next().await.unwrap().block.unwrap().number(), Some(0));
        assert_eq!(b.next().await.unwrap(), BlockEvent::empty());
    }

    #[tokio::test]
    async fn unregister_ends_stream() {
        let source = ChannelBlockSource::new();
        let (reg, mut stream) = source.register("ch", 0).await.unwrap();
        assert_eq!(source.registrations("ch"), 1);

        source.unregister(&reg);
        assert_eq!(source.registrations("ch"), 0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn rejected_channel_fails_registration() {
        let source = ChannelBlockSource::new();
        source.reject("ch", "peer unreachable");
        let err = source.register("ch", 0).await.err().unwrap();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
