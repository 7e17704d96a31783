//! seisbuf-transport: where raw frames come from
//!
//! - [`RingBuffer`]: memory-mapped SPSC ring shared with a producer process
//! - [`read_cycle`]: one non-blocking drain of a ring into a [`FrameBuffer`]
//! - [`BatchSource`]: cycle-at-a-time frame delivery from the ring, NATS or
//!   a replay file

pub mod error;
pub mod frame_buffer;
pub mod nats;
pub mod replay;
pub mod ring_buffer;
pub mod ring_reader;
pub mod ring_source;
pub mod source;

pub use error::{CapacityError, RingError, RingReadError, SourceError};
pub use frame_buffer::{FrameBuffer, DEFAULT_CEILING_BYTES};
pub use nats::{NatsSource, NatsSourceConfig};
pub use replay::{ReplayFormat, ReplaySource, ReplaySourceConfig};
pub use ring_buffer::{RawFrame, RingBuffer, FRAME_KIND_TRACEBUF2, SLOT_SIZE};
pub use ring_reader::{read_cycle, FrameSource, ReadStatus, RingBatch, RingReaderConfig};
pub use ring_source::{RingSource, RingSourceConfig};
pub use source::{BatchSource, SourceBatch};
