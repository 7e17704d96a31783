//! Bounded channel identifiers (network, station, channel, location)

use std::fmt;

use arrayvec::ArrayString;

use crate::error::KeyError;

/// Maximum station code length (tracebuf2 limit, without terminator)
pub const STATION_LEN: usize = 6;

/// Maximum network code length
pub const NETWORK_LEN: usize = 8;

/// Maximum channel code length
pub const CHANNEL_LEN: usize = 3;

/// Maximum location code length
pub const LOCATION_LEN: usize = 2;

/// Identity of one instrument data channel.
///
/// Fields are fixed-capacity strings validated on construction, so a key that
/// exists is always representable in a binary frame header. The canonical
/// form is `network.station.channel.location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    station: ArrayString<STATION_LEN>,
    network: ArrayString<NETWORK_LEN>,
    channel: ArrayString<CHANNEL_LEN>,
    location: ArrayString<LOCATION_LEN>,
}

impl ChannelKey {
    /// Build a key from its four codes. Station, network and channel must be
    /// non-empty; location may be blank.
    pub fn new(
        station: &str,
        network: &str,
        channel: &str,
        location: &str,
    ) -> Result<Self, KeyError> {
        Ok(Self {
            station: bounded("station", station, false)?,
            network: bounded("network", network, false)?,
            channel: bounded("channel", channel, false)?,
            location: bounded("location", location, true)?,
        })
    }

    /// Parse the canonical `network.station.channel.location` form.
    pub fn parse_canonical(name: &str) -> Result<Self, KeyError> {
        let [network, station, channel, location] = split4(name)?;
        Self::new(station, network, channel, location)
    }

    /// Parse the `station.network.channel.location` order used by GNSS
    /// position messages.
    pub fn parse_sncl(sncl: &str) -> Result<Self, KeyError> {
        let [station, network, channel, location] = split4(sncl)?;
        Self::new(station, network, channel, location)
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Canonical lookup name
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Ordering used when grouping messages: station, network, location,
    /// then channel.
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (&self.station, &self.network, &self.location, &self.channel)
    }

    /// Same station/network/location with a different channel code.
    pub fn with_channel(&self, channel: &str) -> Result<Self, KeyError> {
        Ok(Self {
            channel: bounded("channel", channel, false)?,
            ..*self
        })
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.channel, self.location
        )
    }
}

fn split4(input: &str) -> Result<[&str; 4], KeyError> {
    let tokens: Vec<&str> = input.split('.').collect();
    match tokens.as_slice() {
        [a, b, c, d] => Ok([*a, *b, *c, *d]),
        _ => Err(KeyError::TokenCount {
            input: input.to_string(),
            found: tokens.len(),
        }),
    }
}

fn bounded<const N: usize>(
    field: &'static str,
    value: &str,
    allow_empty: bool,
) -> Result<ArrayString<N>, KeyError> {
    if value.is_empty() && !allow_empty {
        return Err(KeyError::Empty { field });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'.')
    {
        return Err(KeyError::InvalidCharacter {
            field,
            value: value.to_string(),
        });
    }
    ArrayString::from(value).map_err(|_| KeyError::TooLong {
        field,
        value: value.to_string(),
        max: N,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        let key = ChannelKey::new("YYYY", "XX", "LYZ", "00").unwrap();
        assert_eq!(key.canonical(), "XX.YYYY.LYZ.00");
        assert_eq!(ChannelKey::parse_canonical("XX.YYYY.LYZ.00").unwrap(), key);
    }

    #[test]
    fn test_sncl_order() {
        let key = ChannelKey::parse_sncl("P373.PW.LY_.00").unwrap();
        assert_eq!(key.station(), "P373");
        assert_eq!(key.network(), "PW");
        assert_eq!(key.channel(), "LY_");
        assert_eq!(key.location(), "00");
    }

    #[test]
    fn test_token_count_is_enforced() {
        assert_eq!(
            ChannelKey::parse_sncl("P373.PW.LY_"),
            Err(KeyError::TokenCount {
                input: "P373.PW.LY_".to_string(),
                found: 3
            })
        );
        assert!(matches!(
            ChannelKey::parse_sncl("P373.PW.LY_.00.extra"),
            Err(KeyError::TokenCount { found: 5, .. })
        ));
    }

    #[test]
    fn test_blank_location_allowed() {
        let key = ChannelKey::parse_sncl("P373.PW.LYZ.").unwrap();
        assert_eq!(key.location(), "");
        assert_eq!(key.canonical(), "PW.P373.LYZ.");
    }

    #[test]
    fn test_rejects_oversized_fields() {
        assert!(matches!(
            ChannelKey::new("TOOLONGSTA", "XX", "LYZ", "00"),
            Err(KeyError::TooLong { field: "station", max: STATION_LEN, .. })
        ));
        assert!(matches!(
            ChannelKey::new("ABCD", "XX", "LYZZ", "00"),
            Err(KeyError::TooLong { field: "channel", .. })
        ));
    }

    #[test]
    fn test_rejects_empty_and_invalid() {
        assert_eq!(
            ChannelKey::new("", "XX", "LYZ", "00"),
            Err(KeyError::Empty { field: "station" })
        );
        assert!(matches!(
            ChannelKey::new("AB CD", "XX", "LYZ", "00"),
            Err(KeyError::InvalidCharacter { field: "station", .. })
        ));
    }

    #[test]
    fn test_with_channel_keeps_identity() {
        let key = ChannelKey::new("P373", "PW", "LYZ", "00").unwrap();
        let north = key.with_channel("LYN").unwrap();
        assert_eq!(north.canonical(), "PW.P373.LYN.00");
        assert_eq!(north.sort_key(), ("P373", "PW", "00", "LYN"));
    }
}
