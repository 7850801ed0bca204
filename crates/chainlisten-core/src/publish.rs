//! Downstream publish interface.
//!
//! The listener hands every block's extracted writes to a [`Publisher`]
//! before advancing the channel cursor. Delivery is at-least-once: after a
//! restart the same block may be published again, so receivers must be
//! idempotent on `(channel_id, block_number)`.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ThirdService;
use crate::error::PublishError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::BlockWrites;

/// Method name used for extracted block writes.
pub const COLLECT_METHOD: &str = "collect";

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver one block's writes under the named method.
    async fn publish(&self, method: &str, writes: &BlockWrites) -> Result<(), PublishError>;
}

/// Publisher that only logs each write. Used when no downstream service is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, method: &str, writes: &BlockWrites) -> Result<(), PublishError> {
        for inv in &writes.invocations {
            tracing::info!(
                channel = %writes.channel_id,
                block = writes.block_number,
                tx = %inv.tx_id,
                chaincode = %inv.namespace,
                input = %inv.args,
                "invocation"
            );
        }
        for w in &writes.records {
            tracing::info!(
                method,
                channel = %writes.channel_id,
                block = writes.block_number,
                namespace = %w.namespace,
                key = %w.key,
                value = %String::from_utf8_lossy(&w.value),
                delete = w.is_delete,
                "write"
            );
        }
        Ok(())
    }
}

/// Configuration for [`HttpPublisher`].
#[derive(Debug, Clone)]
pub struct HttpPublisherConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpPublisherConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// POSTs block writes as JSON to `base/version/mappedPath`.
pub struct HttpPublisher {
    service: ThirdService,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpPublisher {
    pub fn new(service: ThirdService, config: HttpPublisherConfig) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Ok(Self {
            service,
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    async fn send_once(&self, url: &url::Url, writes: &BlockWrites) -> Result<(), PublishError> {
        let resp = self
            .http
            .post(url.clone())
            .json(writes)
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, method: &str, writes: &BlockWrites) -> Result<(), PublishError> {
        let url = self.service.method_url(method)?;
        tracing::debug!(method, %url, records = writes.records.len(), "publishing block writes");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&url, writes).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            %url,
                            "retrying publish"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, %url, "publish retries exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}
