//! seisbuf-store: Parquet persistence of reassembled trace tables
//!
//! Layout under the store root:
//!
//! ```text
//! manifest.json
//! cycle_0/dt_10000.parquet
//! cycle_0/dt_1000000.parquet
//! cycle_1/...
//! ```
//!
//! Each file holds one row per trace of that cycle sharing the sampling
//! interval in its name (microseconds).

pub mod error;
pub mod manifest;
pub mod reader;
pub mod schema;
pub mod writer;

use std::path::Path;

pub use error::StoreError;
pub use manifest::{CycleEntry, GroupEntry, StoreManifest};
pub use reader::{StoreReader, TraceGroup};
pub use writer::StoreWriter;

/// Entry point for opening a store root.
pub struct TraceStore;

impl TraceStore {
    /// Open `root` for writing, creating it if needed.
    pub fn create(root: &Path) -> Result<StoreWriter, StoreError> {
        StoreWriter::create(root)
    }

    /// Open an existing store for reading.
    pub fn open(root: &Path) -> Result<StoreReader, StoreError> {
        StoreReader::open(root)
    }
}
