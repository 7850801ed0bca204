//! Process-wide shutdown signal threaded into every long-running task.

use tokio::sync::watch;

/// Fires the shutdown signal. Dropping the trigger without firing leaves
/// tasks running.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Cloneable receiving side held by each task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

/// Create a linked trigger / signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.0.subscribe())
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn recv(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                // trigger dropped without firing
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_all_signals() {
        let (trigger, signal) = shutdown_channel();
        let mut a = signal.clone();
        let mut b = trigger.signal();
        assert!(!a.is_triggered());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.recv()).await.unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        let res = tokio::time::timeout(Duration::from_millis(20), signal.recv()).await;
        assert!(res.is_err());
    }
}
