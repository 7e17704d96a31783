//! seisbuf-acquire: the acquisition loop
//!
//! Reads frames from one configured transport (shared-memory ring, NATS or
//! file replay), reassembles them into the trace table every cycle and
//! optionally persists each cycle to a Parquet store.

pub mod config;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod server;

pub use config::{Config, SourceConfig};
pub use error::{AcquireError, ConfigError};
pub use runner::{open_source, Acquisition, CycleOutcome, CycleSummary, RunSummary};
