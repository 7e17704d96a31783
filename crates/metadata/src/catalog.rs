use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::channel::ChannelKey;
use crate::error::MetadataError;

/// Sub-channel suffixes synthesized per station, in table order:
/// east/north/up positions (Z, N, E), their errors (3, 2, 1) and quality (Q).
pub const SUB_CHANNEL_SUFFIXES: [char; 7] = ['Z', 'N', 'E', '3', '2', '1', 'Q'];

/// One GNSS site from the operator-supplied station list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    pub network: String,
    pub station: String,
    /// Two-character channel prefix (e.g. "LY"); suffixes are appended.
    pub channel_prefix: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// Elevation above sea level (m)
    #[serde(default)]
    pub elevation: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_gain() -> f64 {
    1.0
}

/// Per-channel scalars persisted alongside the samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub gain: f64,
}

impl Default for ChannelMetadata {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            elevation: 0.0,
            gain: default_gain(),
        }
    }
}

/// A channel of interest with its metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogChannel {
    pub key: ChannelKey,
    pub metadata: ChannelMetadata,
}

/// Station list loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCatalog {
    pub stations: Vec<Station>,
}

impl ChannelCatalog {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let catalog: ChannelCatalog = serde_yaml::from_str(&content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject catalogs the acquisition loop cannot run with.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.stations.is_empty() {
            return Err(MetadataError::Validation(
                "station catalog is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for station in &self.stations {
            if station.channel_prefix.len() != 2 {
                return Err(MetadataError::Validation(format!(
                    "{}.{}: channel prefix '{}' must be exactly 2 characters",
                    station.network, station.station, station.channel_prefix
                )));
            }
            if !(station.gain.is_finite() && station.gain != 0.0) {
                return Err(MetadataError::Validation(format!(
                    "{}.{}: gain must be finite and non-zero",
                    station.network, station.station
                )));
            }
            // Validates field lengths for every suffix at once
            ChannelKey::new(
                &station.station,
                &station.network,
                &format!("{}Z", station.channel_prefix),
                &station.location,
            )?;
            let id = (&station.network, &station.station, &station.location);
            if !seen.insert(id) {
                // Kept: the registry lets the later entry shadow the earlier one
                tracing::warn!(
                    network = %station.network,
                    station = %station.station,
                    location = %station.location,
                    "Station listed more than once in catalog"
                );
            }
        }
        Ok(())
    }

    /// Expand every station into its seven sub-channels, in catalog order.
    pub fn channels(&self) -> Result<Vec<CatalogChannel>, MetadataError> {
        let mut channels = Vec::with_capacity(self.stations.len() * SUB_CHANNEL_SUFFIXES.len());
        for station in &self.stations {
            let metadata = ChannelMetadata {
                latitude: station.latitude,
                longitude: station.longitude,
                elevation: station.elevation,
                gain: station.gain,
            };
            for suffix in SUB_CHANNEL_SUFFIXES {
                let channel = format!("{}{}", station.channel_prefix, suffix);
                let key = ChannelKey::new(
                    &station.station,
                    &station.network,
                    &channel,
                    &station.location,
                )?;
                channels.push(CatalogChannel { key, metadata });
            }
        }
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"
stations:
  - network: PW
    station: P373
    channel_prefix: LY
    location: "00"
    latitude: 45.1
    longitude: -122.3
    elevation: 120.5
  - network: CI
    station: SBCC
    channel_prefix: LY
    location: "00"
    gain: 1000.0
"#;

    #[test]
    fn test_load_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = ChannelCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.stations.len(), 2);
        assert_eq!(catalog.stations[0].gain, 1.0);
        assert_eq!(catalog.stations[1].gain, 1000.0);
    }

    #[test]
    fn test_expands_seven_channels_per_station() {
        let catalog: ChannelCatalog = serde_yaml::from_str(CATALOG).unwrap();
        let channels = catalog.channels().unwrap();
        assert_eq!(channels.len(), 14);

        let names: Vec<String> = channels[..7].iter().map(|c| c.key.canonical()).collect();
        assert_eq!(
            names,
            vec![
                "PW.P373.LYZ.00",
                "PW.P373.LYN.00",
                "PW.P373.LYE.00",
                "PW.P373.LY3.00",
                "PW.P373.LY2.00",
                "PW.P373.LY1.00",
                "PW.P373.LYQ.00",
            ]
        );
        assert_eq!(channels[0].metadata.latitude, 45.1);
        assert_eq!(channels[13].metadata.gain, 1000.0);
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let catalog = ChannelCatalog { stations: vec![] };
        assert!(matches!(
            catalog.validate(),
            Err(MetadataError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let catalog: ChannelCatalog = serde_yaml::from_str(
            r#"
stations:
  - network: PW
    station: P373
    channel_prefix: LYX
"#,
        )
        .unwrap();
        assert!(matches!(
            catalog.validate(),
            Err(MetadataError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_station_rejected() {
        let catalog: ChannelCatalog = serde_yaml::from_str(
            r#"
stations:
  - network: PW
    station: STATIONX
    channel_prefix: LY
"#,
        )
        .unwrap();
        assert!(matches!(catalog.validate(), Err(MetadataError::Key(_))));
    }

    #[test]
    fn test_duplicate_station_is_not_fatal() {
        let catalog: ChannelCatalog = serde_yaml::from_str(
            r#"
stations:
  - network: PW
    station: P373
    channel_prefix: LY
  - network: PW
    station: P373
    channel_prefix: LY
"#,
        )
        .unwrap();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.channels().unwrap().len(), 14);
    }
}
