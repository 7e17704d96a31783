use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::ring_reader::ReadStatus;

/// Raw frames gathered in one acquisition cycle.
#[derive(Debug)]
pub struct SourceBatch {
    pub frames: Vec<Bytes>,
    /// Frames received from the transport, kept or not
    pub read: usize,
    /// Frames dropped before decoding (filtered, oversize)
    pub skipped: usize,
    /// Accumulation buffer growths (ring only)
    pub growths: usize,
    pub status: ReadStatus,
}

impl SourceBatch {
    pub fn empty(status: ReadStatus) -> Self {
        Self {
            frames: Vec::new(),
            read: 0,
            skipped: 0,
            growths: 0,
            status,
        }
    }

    pub fn frame_slices(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.frames.iter().map(|b| b.as_ref())
    }
}

/// A transport that delivers frames in cycles. One per process.
#[async_trait]
pub trait BatchSource: Send {
    /// Short name for logs and metrics
    fn name(&self) -> &'static str;

    /// Gather the next cycle of frames. Returns a batch with status
    /// `Terminated` once the source is exhausted or shutdown is requested.
    async fn next_batch(&mut self, cancel: &CancellationToken) -> Result<SourceBatch, SourceError>;

    async fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}
