//! seisbuf-metadata: channel identity and station catalog types
//!
//! Everything downstream keys off [`ChannelKey`]; the catalog turns the
//! operator-supplied station list into the channels of interest.

pub mod catalog;
pub mod channel;
pub mod error;

pub use catalog::{CatalogChannel, ChannelCatalog, ChannelMetadata, Station, SUB_CHANNEL_SUFFIXES};
pub use channel::{ChannelKey, CHANNEL_LEN, LOCATION_LEN, NETWORK_LEN, STATION_LEN};
pub use error::{KeyError, MetadataError};
