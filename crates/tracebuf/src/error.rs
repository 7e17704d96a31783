use seisbuf_metadata::KeyError;
use thiserror::Error;

/// Why a single frame could not be decoded. The frame is dropped; the batch
/// carries on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    Oversize { len: usize, max: usize },
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown data type '{0}'")]
    UnknownDataType(String),
    #[error("invalid sample count {0}")]
    InvalidSampleCount(i32),
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f64),
    #[error("invalid start time {0}")]
    InvalidStartTime(f64),
    #[error("malformed channel key: {0}")]
    Key(#[from] KeyError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
}

/// Internal inconsistency detected while rebuilding a trace. Aborts the
/// current cycle only.
#[derive(Error, Debug, PartialEq)]
pub enum ReassemblyError {
    #[error("{channel}: appended {appended} samples but messages declared {declared}")]
    SampleCountMismatch {
        channel: String,
        appended: usize,
        declared: usize,
    },
    #[error("{channel}: last chunk boundary {boundary} does not match npts {npts}")]
    ChunkBoundary {
        channel: String,
        boundary: usize,
        npts: usize,
    },
}
