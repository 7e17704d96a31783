use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use seisbuf_tracebuf::ChannelRegistry;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::SourceError;
use crate::ring_buffer::{RingBuffer, FRAME_KIND_TRACEBUF2};
use crate::ring_reader::{read_cycle, ReadStatus, RingReaderConfig};
use crate::source::{BatchSource, SourceBatch};

#[derive(Debug, Clone, Deserialize)]
pub struct RingSourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_message_block")]
    pub message_block: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Pause after a cycle that drained the ring
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
    #[serde(default = "default_frame_kind")]
    pub frame_kind: u32,
    #[serde(default)]
    pub ceiling_bytes: Option<usize>,
}

fn default_message_block() -> usize {
    RingReaderConfig::default().message_block
}

fn default_max_frame_size() -> usize {
    RingReaderConfig::default().max_frame_size
}

fn default_poll_wait_ms() -> u64 {
    100
}

fn default_frame_kind() -> u32 {
    FRAME_KIND_TRACEBUF2
}

impl RingSourceConfig {
    pub fn reader_config(&self) -> RingReaderConfig {
        let defaults = RingReaderConfig::default();
        RingReaderConfig {
            message_block: self.message_block,
            max_frame_size: self.max_frame_size,
            frame_kind: self.frame_kind,
            ceiling_bytes: self.ceiling_bytes.unwrap_or(defaults.ceiling_bytes),
        }
    }
}

/// Polls the shared-memory ring once per cycle.
pub struct RingSource {
    ring: RingBuffer,
    registry: Arc<ChannelRegistry>,
    reader: RingReaderConfig,
    poll_wait: Duration,
    drained: bool,
}

impl RingSource {
    pub fn open(config: &RingSourceConfig, registry: Arc<ChannelRegistry>) -> Result<Self, SourceError> {
        let ring = RingBuffer::open(&config.path)?;
        info!(
            path = %config.path.display(),
            message_block = config.message_block,
            poll_wait_ms = config.poll_wait_ms,
            "Ring source ready"
        );
        Ok(Self::new(ring, config, registry))
    }

    pub fn new(ring: RingBuffer, config: &RingSourceConfig, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            ring,
            registry,
            reader: config.reader_config(),
            poll_wait: Duration::from_millis(config.poll_wait_ms),
            drained: false,
        }
    }
}

#[async_trait]
impl BatchSource for RingSource {
    fn name(&self) -> &'static str {
        "ring"
    }

    async fn next_batch(&mut self, cancel: &CancellationToken) -> Result<SourceBatch, SourceError> {
        if self.drained && !self.poll_wait.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SourceBatch::empty(ReadStatus::Terminated)),
                _ = tokio::time::sleep(self.poll_wait) => {}
            }
        }

        let batch = read_cycle(&mut self.ring, &self.registry, &self.reader, cancel)?;
        self.drained = batch.status == ReadStatus::Drained;

        Ok(SourceBatch {
            frames: batch.frames.iter().map(Bytes::copy_from_slice).collect(),
            read: batch.read,
            skipped: batch.skipped,
            growths: batch.growths,
            status: batch.status,
        })
    }
}
