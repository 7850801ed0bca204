//! Block subscription interface and the sources shipped with ChainListen.
//!
//! A [`BlockSource`] hands out one event stream per registration. The stream
//! ending is the only way a source reports that the subscription is gone;
//! listeners treat it as fatal for that channel unless reconnect is enabled.

mod directory;
mod memory;

pub use directory::DirectoryBlockSource;
pub use memory::ChannelBlockSource;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::SourceError;
use crate::proto::Block;

/// One delivery from a subscription. `block` is `None` when the transport
/// produced an event without a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEvent {
    pub block: Option<Block>,
}

impl BlockEvent {
    pub fn new(block: Block) -> Self {
        Self { block: Some(block) }
    }

    pub fn empty() -> Self {
        Self { block: None }
    }
}

/// Ordered stream of block events for one channel.
pub type BlockEventStream = Pin<Box<dyn Stream<Item = BlockEvent> + Send>>;

/// Handle identifying one live registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration {
    pub channel_id: String,
    pub id: u64,
}

#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Subscribe to `channel_id`, starting with block `from_block`.
    async fn register(
        &self,
        channel_id: &str,
        from_block: u64,
    ) -> Result<(Registration, BlockEventStream), SourceError>;

    /// Release a registration. Its stream ends.
    fn unregister(&self, registration: &Registration);

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Unregisters on drop, so every exit path of a listener releases its
/// subscription.
pub struct RegistrationGuard {
    source: Arc<dyn BlockSource>,
    registration: Registration,
}

impl RegistrationGuard {
    pub fn new(source: Arc<dyn BlockSource>, registration: Registration) -> Self {
        Self {
            source,
            registration,
        }
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        tracing::debug!(
            channel = %self.registration.channel_id,
            id = self.registration.id,
            "unregistering block events"
        );
        self.source.unregister(&self.registration);
    }
}
