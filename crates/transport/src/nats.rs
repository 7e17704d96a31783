//! Core NATS subscription delivering JSON position messages

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::ring_reader::ReadStatus;
use crate::source::{BatchSource, SourceBatch};

#[derive(Debug, Clone, Deserialize)]
pub struct NatsSourceConfig {
    pub url: String,
    pub subject: String,
    /// Queue group; members share the subject's messages
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    #[serde(default = "default_message_block")]
    pub message_block: usize,
    /// How long one cycle waits for messages
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_max_payload_size() -> usize {
    512
}

fn default_message_block() -> usize {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    1000
}

pub struct NatsSource {
    subscriber: async_nats::Subscriber,
    config: NatsSourceConfig,
}

impl NatsSource {
    pub async fn connect(config: &NatsSourceConfig) -> Result<Self, SourceError> {
        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| SourceError::Nats(e.to_string()))?;

        let subscriber = match &config.group {
            Some(group) => client
                .queue_subscribe(config.subject.clone(), group.clone())
                .await
                .map_err(|e| SourceError::Nats(e.to_string()))?,
            None => client
                .subscribe(config.subject.clone())
                .await
                .map_err(|e| SourceError::Nats(e.to_string()))?,
        };

        info!(
            url = %config.url,
            subject = %config.subject,
            group = config.group.as_deref().unwrap_or(""),
            "Connected to NATS"
        );

        Ok(Self {
            subscriber,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl BatchSource for NatsSource {
    fn name(&self) -> &'static str {
        "nats"
    }

    async fn next_batch(&mut self, cancel: &CancellationToken) -> Result<SourceBatch, SourceError> {
        let payloads = (&mut self.subscriber).map(|msg| msg.payload);
        Ok(collect_batch(
            payloads,
            self.config.message_block,
            self.config.max_payload_size,
            Duration::from_millis(self.config.fetch_timeout_ms),
            cancel,
        )
        .await)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.subscriber
            .unsubscribe()
            .await
            .map_err(|e| SourceError::Nats(e.to_string()))
    }
}

/// Take up to `block` payloads or whatever arrives before `timeout`.
/// Payloads larger than `max_payload` are dropped; a closed stream ends the
/// source.
pub(crate) async fn collect_batch<S>(
    mut stream: S,
    block: usize,
    max_payload: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SourceBatch
where
    S: Stream<Item = Bytes> + Unpin,
{
    let mut batch = SourceBatch::empty(ReadStatus::Drained);
    let deadline = tokio::time::Instant::now() + timeout;

    while batch.frames.len() < block {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                batch.status = ReadStatus::Terminated;
                break;
            }
            next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                Ok(Some(payload)) => {
                    batch.read += 1;
                    if payload.len() > max_payload {
                        warn!(len = payload.len(), max = max_payload, "Skipping oversize message");
                        batch.skipped += 1;
                    } else {
                        batch.frames.push(payload);
                    }
                }
                Ok(None) => {
                    warn!("Subscription closed");
                    batch.status = ReadStatus::Terminated;
                    break;
                }
                Err(_) => break,
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn payloads(sizes: &[usize]) -> Vec<Bytes> {
        sizes.iter().map(|&n| Bytes::from(vec![b'x'; n])).collect()
    }

    #[tokio::test]
    async fn test_caps_batch_at_message_block() {
        let items = stream::iter(payloads(&[10; 7])).chain(stream::pending());
        let batch = collect_batch(
            Box::pin(items),
            5,
            64,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(batch.frames.len(), 5);
        assert_eq!(batch.status, ReadStatus::Drained);
    }

    #[tokio::test]
    async fn test_skips_oversize_and_stops_at_timeout() {
        let items = stream::iter(payloads(&[10, 100, 20])).chain(stream::pending());
        let batch = collect_batch(
            Box::pin(items),
            50,
            64,
            Duration::from_millis(20),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(batch.read, 3);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.frames.len(), 2);
        assert_eq!(batch.status, ReadStatus::Drained);
    }

    #[tokio::test]
    async fn test_closed_stream_terminates() {
        let batch = collect_batch(
            stream::iter(payloads(&[1, 2])),
            50,
            64,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(batch.frames.len(), 2);
        assert_eq!(batch.status, ReadStatus::Terminated);
    }

    #[tokio::test]
    async fn test_cancel_terminates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let batch = collect_batch(
            Box::pin(stream::pending::<Bytes>()),
            50,
            64,
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert_eq!(batch.status, ReadStatus::Terminated);
    }

    #[test]
    fn test_config_defaults() {
        let config: NatsSourceConfig = serde_json::from_str(
            r#"{"url": "nats://localhost:4222", "subject": "gnss.positions"}"#,
        )
        .unwrap();
        assert_eq!(config.group, None);
        assert_eq!(config.max_payload_size, 512);
        assert_eq!(config.message_block, 1000);
    }
}
