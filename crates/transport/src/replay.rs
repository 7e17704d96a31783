//! File replay: recorded position messages or tracebuf2 frames fed through
//! the same pipeline as live data

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use seisbuf_tracebuf::TraceFrame;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::SourceError;
use crate::ring_reader::ReadStatus;
use crate::source::{BatchSource, SourceBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFormat {
    /// One JSON document per line
    Json,
    /// Back-to-back tracebuf2 frames
    Frames,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaySourceConfig {
    pub path: PathBuf,
    pub format: ReplayFormat,
    #[serde(default = "default_message_block")]
    pub message_block: usize,
}

fn default_message_block() -> usize {
    200
}

pub struct ReplaySource {
    frames: Vec<Bytes>,
    cursor: usize,
    block: usize,
}

impl ReplaySource {
    pub async fn open(config: &ReplaySourceConfig) -> Result<Self, SourceError> {
        let content = tokio::fs::read(&config.path).await?;
        let frames = split_frames(&config.path, Bytes::from(content), config.format)?;
        info!(
            path = %config.path.display(),
            frames = frames.len(),
            "Loaded replay file"
        );
        Ok(Self::from_frames(frames, config.message_block))
    }

    pub fn from_frames(frames: Vec<Bytes>, block: usize) -> Self {
        Self {
            frames,
            cursor: 0,
            block: block.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }
}

#[async_trait]
impl BatchSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn next_batch(&mut self, cancel: &CancellationToken) -> Result<SourceBatch, SourceError> {
        if cancel.is_cancelled() || self.remaining() == 0 {
            return Ok(SourceBatch::empty(ReadStatus::Terminated));
        }
        let end = (self.cursor + self.block).min(self.frames.len());
        let frames = self.frames[self.cursor..end].to_vec();
        self.cursor = end;

        let mut batch = SourceBatch::empty(ReadStatus::Drained);
        batch.read = frames.len();
        batch.frames = frames;
        Ok(batch)
    }
}

fn split_frames(path: &Path, content: Bytes, format: ReplayFormat) -> Result<Vec<Bytes>, SourceError> {
    match format {
        ReplayFormat::Json => {
            let mut frames = Vec::new();
            let mut start = 0;
            for (i, &b) in content.iter().enumerate() {
                if b == b'\n' {
                    push_line(&mut frames, &content, start, i);
                    start = i + 1;
                }
            }
            push_line(&mut frames, &content, start, content.len());
            Ok(frames)
        }
        ReplayFormat::Frames => {
            let mut frames = Vec::new();
            let mut offset = 0;
            while offset < content.len() {
                let len = TraceFrame::encoded_len(&content[offset..]).map_err(|e| {
                    SourceError::Replay {
                        path: path.to_path_buf(),
                        detail: format!("bad frame header at byte {}: {}", offset, e),
                    }
                })?;
                if offset + len > content.len() {
                    return Err(SourceError::Replay {
                        path: path.to_path_buf(),
                        detail: format!("frame at byte {} runs past end of file", offset),
                    });
                }
                frames.push(content.slice(offset..offset + len));
                offset += len;
            }
            Ok(frames)
        }
    }
}

fn push_line(frames: &mut Vec<Bytes>, content: &Bytes, start: usize, end: usize) {
    let line = content.slice(start..end);
    if !line.iter().all(u8::is_ascii_whitespace) {
        frames.push(line);
    }
}
