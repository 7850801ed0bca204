//! Per-channel listener: subscribe, extract, publish, advance the cursor.
//!
//! ```text
//! Starting ─► Listening ◄──► Stalled
//!                 │
//!                 ▼
//!              Closed   (stream ended, fatal error or shutdown)
//! ```
//!
//! A stall only logs; the subscription is kept. A closed stream ends the
//! listener with [`ListenerError::StreamClosed`] unless a reconnect policy
//! is configured, in which case it re-registers from the stored cursor.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use chainlisten_core::checkpoint::CheckpointStore;
use chainlisten_core::error::CheckpointError;
use chainlisten_core::publish::{Publisher, COLLECT_METHOD};
use chainlisten_core::retry::RetryPolicy;
use chainlisten_core::shutdown::ShutdownSignal;

use crate::error::ListenerError;
use crate::extractor::BlockExtractor;
use crate::proto::Block;
use crate::source::{BlockEventStream, BlockSource, RegistrationGuard};

/// Default time without any event before a channel is reported stalled.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Listening,
    Stalled,
    Closed,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stalled => "stalled",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a subscription session ended.
enum SessionEnd {
    Shutdown,
    StreamClosed { delivered: u64 },
}

pub struct ChannelListener {
    channel_id: String,
    source: Arc<dyn BlockSource>,
    store: Arc<CheckpointStore>,
    publisher: Arc<dyn Publisher>,
    extractor: BlockExtractor,
    stall_timeout: Duration,
    reconnect: RetryPolicy,
    state: watch::Sender<ListenerState>,
}

impl ChannelListener {
    pub fn new(
        channel_id: impl Into<String>,
        source: Arc<dyn BlockSource>,
        store: Arc<CheckpointStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let channel_id = channel_id.into();
        let (state, _) = watch::channel(ListenerState::Starting);
        Self {
            extractor: BlockExtractor::new(channel_id.clone()),
            channel_id,
            source,
            store,
            publisher,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            reconnect: RetryPolicy::none(),
            state,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Re-register after a failed registration or closed stream, up to the
    /// policy's retry count. The count resets whenever a session delivers a
    /// block.
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Watch the listener's state.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Run until shutdown or a fatal condition for this channel.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), ListenerError> {
        let result = self.run_sessions(&mut shutdown).await;
        self.set_state(ListenerState::Closed);
        match &result {
            Ok(()) => tracing::info!(channel = %self.channel_id, "listener stopped"),
            Err(e) => tracing::error!(channel = %self.channel_id, error = %e, "listener terminated"),
        }
        result
    }

    async fn run_sessions(&self, shutdown: &mut ShutdownSignal) -> Result<(), ListenerError> {
        let mut attempt = 0u32;
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }
            self.set_state(ListenerState::Starting);

            let from = self
                .store
                .next_block(&self.channel_id)
                .ok_or_else(|| CheckpointError::UnknownChannel(self.channel_id.clone()))?;

            let (registration, mut stream) = match self.source.register(&self.channel_id, from).await {
                Ok(subscription) => subscription,
                Err(source) => {
                    attempt += 1;
                    match self.reconnect.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                channel = %self.channel_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %source,
                                "block event registration failed, retrying"
                            );
                            if sleep_or_shutdown(delay, shutdown).await {
                                return Ok(());
                            }
                            continue;
                        }
                        None => {
                            return Err(ListenerError::Register {
                                channel: self.channel_id.clone(),
                                source,
                            })
                        }
                    }
                }
            };
            let _guard = RegistrationGuard::new(Arc::clone(&self.source), registration);

            tracing::info!(
                channel = %self.channel_id,
                from_block = from,
                source = %self.source.describe(),
                "listening for block events"
            );
            self.set_state(ListenerState::Listening);

            match self.consume(&mut stream, shutdown).await? {
                SessionEnd::Shutdown => return Ok(()),
                SessionEnd::StreamClosed { delivered } => {
                    if delivered > 0 {
                        attempt = 0;
                    }
                    attempt += 1;
                    match self.reconnect.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                channel = %self.channel_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                cursor = ?self.store.cursor(&self.channel_id),
                                "block stream closed, reconnecting"
                            );
                            if sleep_or_shutdown(delay, shutdown).await {
                                return Ok(());
                            }
                        }
                        None => {
                            return Err(ListenerError::StreamClosed {
                                channel: self.channel_id.clone(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// Pull events until the stream ends or shutdown fires.
    async fn consume(
        &self,
        stream: &mut BlockEventStream,
        shutdown: &mut ShutdownSignal,
    ) -> Result<SessionEnd, ListenerError> {
        let mut delivered = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
                next = tokio::time::timeout(self.stall_timeout, stream.next()) => next,
            };

            let event = match next {
                Err(_) => {
                    tracing::warn!(
                        channel = %self.channel_id,
                        timeout_secs = self.stall_timeout.as_secs(),
                        cursor = ?self.store.cursor(&self.channel_id),
                        "no block event received within stall timeout"
                    );
                    self.set_state(ListenerState::Stalled);
                    continue;
                }
                Ok(None) => return Ok(SessionEnd::StreamClosed { delivered }),
                Ok(Some(event)) => event,
            };

            if *self.state.borrow() == ListenerState::Stalled {
                tracing::info!(channel = %self.channel_id, "block events resumed");
            }
            self.set_state(ListenerState::Listening);

            match event.block {
                Some(block) => {
                    self.handle_block(&block).await?;
                    delivered += 1;
                }
                None => tracing::error!(channel = %self.channel_id, "received block event without a block"),
            }
        }
    }

    async fn handle_block(&self, block: &Block) -> Result<(), ListenerError> {
        let writes = self
            .extractor
            .extract(block)
            .map_err(|source| ListenerError::Extract {
                channel: self.channel_id.clone(),
                block: block.number(),
                source,
            })?;

        if writes.is_empty() {
            tracing::debug!(
                channel = %self.channel_id,
                block = writes.block_number,
                "block carries no business writes"
            );
        } else if let Err(e) = self.publisher.publish(COLLECT_METHOD, &writes).await {
            tracing::error!(
                channel = %self.channel_id,
                block = writes.block_number,
                records = writes.records.len(),
                error = %e,
                "failed to publish block writes"
            );
        }

        self.store.update(&self.channel_id, writes.block_number)?;
        tracing::debug!(
            channel = %self.channel_id,
            block = writes.block_number,
            records = writes.records.len(),
            "processed block"
        );
        Ok(())
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

/// Returns `true` if shutdown fired first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut ShutdownSignal) -> bool {
    tokio::select! {
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
