//! seisbuf-tracebuf: trace reassembly engine
//!
//! Turns unordered batches of sensor frames into per-channel, time-ordered,
//! gap-aware sample runs:
//!
//! - [`ChannelRegistry`] maps canonical channel names to trace slots
//! - [`Decoder`] normalizes binary ring frames and JSON position messages
//! - [`reassemble`] sorts a batch and rebuilds the [`TraceTable`]

pub mod decoder;
pub mod error;
pub mod frame;
pub mod reassembly;
pub mod registry;
pub mod trace;

pub use decoder::{DecodedBatch, DecodedMessage, Decoder, JsonDecoder, RingFrameDecoder};
pub use error::{DecodeError, ReassemblyError};
pub use frame::{ByteOrder, SampleWidth, TraceFrame, FRAME_HEADER_LEN, MAX_FRAME_SIZE};
pub use reassembly::{reassemble, ReassemblyReport, GAP_TOLERANCE_SECS};
pub use registry::{ChainStats, ChannelRegistry};
pub use trace::{Trace, TraceTable};
