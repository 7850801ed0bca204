//! Supervisor: owns the process lifetime of all listeners and the
//! checkpoint scheduler.
//!
//! Startup order: load the persisted record, merge it with the configured
//! channels, start the scheduler, then spawn one listener task per channel.
//! A listener failing only ends that channel; the others keep running. Once
//! every listener has stopped the scheduler is told to do its final flush.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use chainlisten_core::checkpoint::{CheckpointStorage, CheckpointStore};
use chainlisten_core::config::Configuration;
use chainlisten_core::publish::Publisher;
use chainlisten_core::retry::RetryPolicy;
use chainlisten_core::scheduler::CheckpointScheduler;
use chainlisten_core::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};

use crate::error::{ListenerError, SupervisorError};
use crate::listener::{ChannelListener, ListenerState};
use crate::source::BlockSource;

pub struct Supervisor {
    config: Configuration,
    source: Arc<dyn BlockSource>,
    storage: Arc<dyn CheckpointStorage>,
    publisher: Arc<dyn Publisher>,
}

impl Supervisor {
    pub fn new(
        config: Configuration,
        source: Arc<dyn BlockSource>,
        storage: Arc<dyn CheckpointStorage>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            source,
            storage,
            publisher,
        }
    }

    /// Start the scheduler and every listener. Errors here are startup
    /// failures; nothing has been spawned when one is returned.
    pub async fn start(self, shutdown: ShutdownSignal) -> Result<SupervisorHandle, SupervisorError> {
        self.config.validate()?;

        let persisted = self.storage.load().await?;
        let store = Arc::new(CheckpointStore::load(
            &self.config.listen_channels,
            persisted.as_ref(),
        ));
        let scheduler = CheckpointScheduler::new(
            Arc::clone(&store),
            Arc::clone(&self.storage),
            self.config.record_interval(),
        )?;

        let (flush_trigger, flush_signal) = shutdown_channel();
        let scheduler = tokio::spawn(scheduler.run(flush_signal));

        let reconnect = RetryPolicy::new(self.config.reconnect.retry_config());
        let mut listeners = Vec::with_capacity(self.config.listen_channels.len());
        let mut states = HashMap::with_capacity(self.config.listen_channels.len());
        for channel in &self.config.listen_channels {
            let listener = ChannelListener::new(
                channel.id.clone(),
                Arc::clone(&self.source),
                Arc::clone(&store),
                Arc::clone(&self.publisher),
            )
            .with_stall_timeout(self.config.stall_timeout())
            .with_reconnect(reconnect.clone());

            states.insert(channel.id.clone(), listener.state());
            listeners.push((channel.id.clone(), tokio::spawn(listener.run(shutdown.clone()))));
        }

        tracing::info!(
            channels = listeners.len(),
            source = %self.source.describe(),
            checkpoint = %self.storage.location(),
            "supervisor started"
        );

        Ok(SupervisorHandle {
            store,
            states,
            listeners,
            scheduler,
            flush_trigger,
        })
    }
}

/// Running supervisor.
pub struct SupervisorHandle {
    store: Arc<CheckpointStore>,
    states: HashMap<String, watch::Receiver<ListenerState>>,
    listeners: Vec<(String, JoinHandle<Result<(), ListenerError>>)>,
    scheduler: JoinHandle<()>,
    flush_trigger: ShutdownTrigger,
}

/// Final result of one channel listener.
#[derive(Debug)]
pub struct ChannelExit {
    pub channel_id: String,
    pub result: Result<(), ListenerError>,
}

impl SupervisorHandle {
    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    /// Current state of `channel_id`'s listener.
    pub fn state(&self, channel_id: &str) -> Option<ListenerState> {
        self.states.get(channel_id).map(|rx| *rx.borrow())
    }

    /// A watch on `channel_id`'s listener state.
    pub fn watch_state(&self, channel_id: &str) -> Option<watch::Receiver<ListenerState>> {
        self.states.get(channel_id).cloned()
    }

    /// Wait for every listener to stop, then flush the store one last time.
    pub async fn join(self) -> Vec<ChannelExit> {
        let mut exits = Vec::with_capacity(self.listeners.len());
        for (channel_id, task) in self.listeners {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(ListenerError::Aborted {
                    channel: channel_id.clone(),
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = &result {
                tracing::error!(channel = %channel_id, error = %e, "channel listener failed");
            }
            exits.push(ChannelExit { channel_id, result });
        }

        self.flush_trigger.trigger();
        if let Err(e) = self.scheduler.await {
            tracing::error!(error = %e, "checkpoint scheduler task failed");
        }

        let failed = exits.iter().filter(|x| x.result.is_err()).count();
        tracing::info!(channels = exits.len(), failed, "supervisor stopped");
        exits
    }
}
