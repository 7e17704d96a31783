//! One read cycle against the shared-memory ring
//!
//! The reader drains whatever the producer has published, keeping only
//! frames of the configured kind whose channel is in the registry. It never
//! blocks: an empty ring ends the cycle.

use seisbuf_tracebuf::{ChannelRegistry, TraceFrame, MAX_FRAME_SIZE};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{RingError, RingReadError};
use crate::frame_buffer::{FrameBuffer, DEFAULT_CEILING_BYTES};
use crate::ring_buffer::{RawFrame, RingBuffer, FRAME_KIND_TRACEBUF2};

/// Anything the reader can poll for frames.
pub trait FrameSource {
    /// Producer-side request to stop
    fn termination_requested(&self) -> bool;

    /// Copy out the next frame, `Ok(None)` when nothing is pending.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, RingError>;
}

impl FrameSource for RingBuffer {
    fn termination_requested(&self) -> bool {
        self.terminate_requested()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, RingError> {
        self.try_read()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RingReaderConfig {
    /// Frames per growth block
    #[serde(default = "default_message_block")]
    pub message_block: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Slot kind to keep; others are filtered out
    #[serde(default = "default_frame_kind")]
    pub frame_kind: u32,
    /// Hard limit on the accumulation buffer
    #[serde(default = "default_ceiling_bytes")]
    pub ceiling_bytes: usize,
}

fn default_message_block() -> usize {
    200
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_frame_kind() -> u32 {
    FRAME_KIND_TRACEBUF2
}

fn default_ceiling_bytes() -> usize {
    DEFAULT_CEILING_BYTES
}

impl Default for RingReaderConfig {
    fn default() -> Self {
        Self {
            message_block: default_message_block(),
            max_frame_size: default_max_frame_size(),
            frame_kind: default_frame_kind(),
            ceiling_bytes: default_ceiling_bytes(),
        }
    }
}

/// How a read cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Ring ran empty
    Drained,
    /// Shutdown requested; frames read so far are kept
    Terminated,
    /// Buffer ceiling hit; remaining frames stay in the ring
    CeilingReached,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::Drained => "drained",
            ReadStatus::Terminated => "terminated",
            ReadStatus::CeilingReached => "ceiling_reached",
        }
    }
}

#[derive(Debug)]
enum PollState {
    Poll,
    GotMessage(RawFrame),
    GotNone,
    FilteredOut,
    BufferGrown,
    CeilingReached,
    Terminated,
    ReadError(RingError),
}

/// Output of one cycle.
#[derive(Debug)]
pub struct RingBatch {
    pub frames: FrameBuffer,
    /// Frames taken off the ring
    pub read: usize,
    /// Frames filtered out by kind, header or registry
    pub skipped: usize,
    pub accepted: usize,
    pub growths: usize,
    pub status: ReadStatus,
}

/// Drain `source` into a fresh buffer.
pub fn read_cycle<S: FrameSource + ?Sized>(
    source: &mut S,
    registry: &ChannelRegistry,
    config: &RingReaderConfig,
    cancel: &CancellationToken,
) -> Result<RingBatch, RingReadError> {
    let mut buffer = FrameBuffer::new(
        config.max_frame_size,
        config.message_block,
        config.ceiling_bytes,
    )?;
    let mut read = 0usize;
    let mut skipped = 0usize;
    let mut accepted = 0usize;

    let mut state = PollState::Poll;
    let status = loop {
        state = match state {
            PollState::Poll => {
                if cancel.is_cancelled() || source.termination_requested() {
                    PollState::Terminated
                } else if buffer.is_full() {
                    if buffer.can_grow() {
                        buffer.grow()?;
                        PollState::BufferGrown
                    } else {
                        PollState::CeilingReached
                    }
                } else {
                    match source.next_frame() {
                        Ok(Some(frame)) => PollState::GotMessage(frame),
                        Ok(None) => PollState::GotNone,
                        Err(e) => PollState::ReadError(e),
                    }
                }
            }
            PollState::GotMessage(frame) => {
                read += 1;
                if keep_frame(&frame, registry, config) {
                    buffer.push(&frame.data)?;
                    accepted += 1;
                    PollState::Poll
                } else {
                    PollState::FilteredOut
                }
            }
            PollState::FilteredOut => {
                skipped += 1;
                PollState::Poll
            }
            PollState::BufferGrown => {
                debug!(
                    capacity = buffer.capacity(),
                    bytes = buffer.capacity_bytes(),
                    "Grew ring read buffer"
                );
                PollState::Poll
            }
            PollState::GotNone => break ReadStatus::Drained,
            PollState::Terminated => break ReadStatus::Terminated,
            PollState::CeilingReached => {
                warn!(
                    frames = buffer.len(),
                    bytes = buffer.capacity_bytes(),
                    ceiling = config.ceiling_bytes,
                    "Ring read buffer at ceiling, ending cycle early"
                );
                break ReadStatus::CeilingReached;
            }
            PollState::ReadError(e) => return Err(e.into()),
        };
    };

    trace!(read, skipped, accepted, status = status.as_str(), "Ring read cycle");
    Ok(RingBatch {
        growths: buffer.growths(),
        frames: buffer,
        read,
        skipped,
        accepted,
        status,
    })
}

fn keep_frame(frame: &RawFrame, registry: &ChannelRegistry, config: &RingReaderConfig) -> bool {
    if frame.kind != config.frame_kind {
        trace!(kind = frame.kind, "Filtered frame of other kind");
        return false;
    }
    if frame.data.len() > config.max_frame_size {
        warn!(len = frame.data.len(), max = config.max_frame_size, "Oversize frame in ring");
        return false;
    }
    match TraceFrame::peek_key(&frame.data) {
        Ok(key) => registry.contains(&key.canonical()).is_some(),
        Err(e) => {
            debug!(error = %e, "Undecodable frame header");
            false
        }
    }
}
