use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use seisbuf_tracebuf::{Decoder, JsonDecoder, RingFrameDecoder, FRAME_HEADER_LEN, MAX_FRAME_SIZE};
use seisbuf_transport::{NatsSourceConfig, ReplayFormat, ReplaySourceConfig, RingSourceConfig};

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Station catalog YAML
    pub catalog: PathBuf,
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

/// The one transport this process reads from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Ring(RingSourceConfig),
    Nats(NatsSourceConfig),
    Replay(ReplaySourceConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("catalog path is empty".to_string()));
        }
        if let Some(storage) = &self.storage {
            if storage.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("storage.path is empty".to_string()));
            }
        }
        self.source.validate()
    }
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Ring(_) => "ring",
            SourceConfig::Nats(_) => "nats",
            SourceConfig::Replay(_) => "replay",
        }
    }

    /// Decoder matching the wire format this source delivers.
    pub fn decoder(&self) -> Decoder {
        match self {
            SourceConfig::Ring(ring) => Decoder::RingFrame(RingFrameDecoder::new(ring.max_frame_size)),
            SourceConfig::Nats(_) => Decoder::Json(JsonDecoder),
            SourceConfig::Replay(replay) => match replay.format {
                ReplayFormat::Json => Decoder::Json(JsonDecoder),
                ReplayFormat::Frames => Decoder::RingFrame(RingFrameDecoder::default()),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let message_block = match self {
            SourceConfig::Ring(ring) => {
                if ring.path.as_os_str().is_empty() {
                    return Err(invalid("source.path is empty"));
                }
                if ring.max_frame_size <= FRAME_HEADER_LEN || ring.max_frame_size > MAX_FRAME_SIZE {
                    return Err(ConfigError::Invalid(format!(
                        "source.max_frame_size must be in {}..={}, got {}",
                        FRAME_HEADER_LEN + 1,
                        MAX_FRAME_SIZE,
                        ring.max_frame_size
                    )));
                }
                let reader = ring.reader_config();
                let initial = reader.message_block.saturating_mul(reader.max_frame_size);
                if initial > reader.ceiling_bytes {
                    return Err(ConfigError::Invalid(format!(
                        "source.message_block * source.max_frame_size ({}) exceeds ceiling of {} bytes",
                        initial, reader.ceiling_bytes
                    )));
                }
                ring.message_block
            }
            SourceConfig::Nats(nats) => {
                if nats.url.is_empty() {
                    return Err(invalid("source.url is empty"));
                }
                if nats.subject.is_empty() {
                    return Err(invalid("source.subject is empty"));
                }
                if nats.max_payload_size == 0 {
                    return Err(invalid("source.max_payload_size must be greater than zero"));
                }
                if nats.fetch_timeout_ms == 0 {
                    return Err(invalid("source.fetch_timeout_ms must be greater than zero"));
                }
                nats.message_block
            }
            SourceConfig::Replay(replay) => {
                if replay.path.as_os_str().is_empty() {
                    return Err(invalid("source.path is empty"));
                }
                replay.message_block
            }
        };
        if message_block == 0 {
            return Err(invalid("source.message_block must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
