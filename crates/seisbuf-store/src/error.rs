use seisbuf_metadata::KeyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("stored channel key invalid: {0}")]
    Key(#[from] KeyError),

    #[error("unexpected file layout: {0}")]
    Schema(String),

    #[error("cycle {0} not found")]
    CycleNotFound(u64),

    #[error("store writer already closed")]
    Closed,
}
