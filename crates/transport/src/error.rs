use std::path::PathBuf;

use thiserror::Error;

/// Failures of the shared-memory ring itself.
#[derive(Error, Debug)]
pub enum RingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path}: not a ring region (magic {found:#x})")]
    BadMagic { path: PathBuf, found: u64 },
    #[error("{path}: region geometry mismatch: {detail}")]
    Geometry { path: PathBuf, detail: String },
    #[error("slot {slot} is corrupt: length {len} exceeds payload capacity {max}")]
    CorruptSlot { slot: u64, len: usize, max: usize },
}

/// The accumulation buffer cannot take another frame.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapacityError {
    #[error("growing to {requested} bytes would exceed ceiling of {ceiling} bytes")]
    Ceiling { requested: usize, ceiling: usize },
    #[error("frame of {len} bytes exceeds slot stride of {stride}")]
    FrameTooLarge { len: usize, stride: usize },
    #[error("buffer is full")]
    Full,
}

/// A ring read cycle could not complete.
#[derive(Error, Debug)]
pub enum RingReadError {
    #[error("ring read failed: {0}")]
    Ring(#[from] RingError),
    #[error("buffer capacity: {0}")]
    Capacity(#[from] CapacityError),
}

/// Errors from any batch source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Read(#[from] RingReadError),
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("NATS error: {0}")]
    Nats(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("replay file {path}: {detail}")]
    Replay { path: PathBuf, detail: String },
}
