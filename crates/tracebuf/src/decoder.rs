//! Wire format normalization
//!
//! Both binary ring frames and JSON position messages decode into
//! [`DecodedMessage`]s so the reassembly engine never sees the wire format.

use seisbuf_metadata::{ChannelKey, SUB_CHANNEL_SUFFIXES};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::frame::{TraceFrame, MAX_FRAME_SIZE};

/// Sampling interval assigned to JSON position messages. The messages carry
/// one sample each at a fixed one-second cadence.
pub const JSON_SAMPLE_INTERVAL: f64 = 1.0;

/// One channel's worth of samples from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub key: ChannelKey,
    /// Canonical `net.sta.chan.loc` name used for registry lookup
    pub name: String,
    /// Epoch seconds of the first sample
    pub start_time: f64,
    pub samples: Vec<f64>,
    /// Sample count announced by the frame
    pub sample_count: usize,
    /// Sampling interval in seconds
    pub dt: f64,
}

impl DecodedMessage {
    pub fn new(key: ChannelKey, start_time: f64, samples: Vec<f64>, dt: f64) -> Self {
        Self {
            name: key.canonical(),
            key,
            start_time,
            sample_count: samples.len(),
            samples,
            dt,
        }
    }
}

/// Result of decoding one cycle's worth of frames.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub messages: Vec<DecodedMessage>,
    /// Frames presented to the decoder
    pub frames: usize,
    /// Frames dropped because they failed to decode
    pub failed: usize,
}

/// tracebuf2 frames from the shared-memory ring.
#[derive(Debug, Clone)]
pub struct RingFrameDecoder {
    max_frame_size: usize,
}

impl RingFrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Vec<DecodedMessage>, DecodeError> {
        let frame = TraceFrame::parse(raw, self.max_frame_size)?;
        let dt = frame.dt();
        let samples = frame.samples.iter().map(|&s| f64::from(s)).collect();
        Ok(vec![DecodedMessage::new(frame.key, frame.start_time, samples, dt)])
    }
}

impl Default for RingFrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

/// GNSS position messages, one JSON document per frame:
///
/// ```json
/// {"time": 1700000000000, "Q": 100, "type": "ENU", "SNCL": "P373.PW.LY_.00",
///  "coor": [0.01, -0.02, 0.003], "err": [0.001, 0.001, 0.004], "rate": 1}
/// ```
///
/// Each document fans out into seven sub-channels (see
/// [`SUB_CHANNEL_SUFFIXES`]) carrying up, north and east positions, their
/// errors in the same order, and the quality flag.
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<DecodedMessage>, DecodeError> {
        // Slot copies are NUL padded to a fixed size
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        let doc: Value = serde_json::from_slice(&raw[..end])?;
        let obj = doc.as_object().ok_or(DecodeError::NotAnObject)?;

        let sncl = match obj.get("SNCL").and_then(Value::as_str) {
            Some(s) => s,
            None => {
                warn!("Position message missing SNCL string");
                ""
            }
        };
        let base = ChannelKey::parse_sncl(sncl)?;

        let time_ms = number_field(obj, "time", sncl, 0.0);
        let quality = number_field(obj, "Q", sncl, 0.0);
        let coor = triple_field(obj, "coor", sncl);
        let err = triple_field(obj, "err", sncl);
        let rate = number_field(obj, "rate", sncl, 1.0);
        match obj.get("type") {
            Some(Value::String(t)) if t != "ENU" => {
                debug!(sncl, kind = %t, "Position message is not ENU")
            }
            Some(Value::String(_)) => {}
            _ => debug!(sncl, "Position message type missing or not a string"),
        }
        debug!(sncl, rate, "Decoded position message");

        let start_time = time_ms / 1000.0;
        let values = [coor[2], coor[1], coor[0], err[2], err[1], err[0], quality];
        let prefix = base.channel().get(..2).unwrap_or(base.channel());

        let mut messages = Vec::with_capacity(SUB_CHANNEL_SUFFIXES.len());
        for (suffix, value) in SUB_CHANNEL_SUFFIXES.iter().zip(values) {
            let key = base.with_channel(&format!("{prefix}{suffix}"))?;
            messages.push(DecodedMessage::new(
                key,
                start_time,
                vec![value],
                JSON_SAMPLE_INTERVAL,
            ));
        }
        Ok(messages)
    }
}

fn number_field(obj: &Map<String, Value>, field: &str, sncl: &str, default: f64) -> f64 {
    match obj.get(field).and_then(Value::as_f64) {
        Some(v) => v,
        None => {
            debug!(sncl, field, default, "Missing or non-numeric field, using default");
            default
        }
    }
}

fn triple_field(obj: &Map<String, Value>, field: &str, sncl: &str) -> [f64; 3] {
    let mut out = [0.0; 3];
    match obj.get(field).and_then(Value::as_array) {
        Some(items) => {
            if items.len() < 3 {
                warn!(sncl, field, len = items.len(), "Short array, padding with zeros");
            }
            for (slot, item) in out.iter_mut().zip(items) {
                match item.as_f64() {
                    Some(v) => *slot = v,
                    None => debug!(sncl, field, "Non-numeric array element, using 0"),
                }
            }
        }
        None => warn!(sncl, field, "Missing or non-array field, using zeros"),
    }
    out
}

/// Frame decoder selected by the source configuration.
#[derive(Debug, Clone)]
pub enum Decoder {
    RingFrame(RingFrameDecoder),
    Json(JsonDecoder),
}

impl Decoder {
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<DecodedMessage>, DecodeError> {
        match self {
            Decoder::RingFrame(d) => d.decode(raw),
            Decoder::Json(d) => d.decode(raw),
        }
    }

    /// Decode every frame in a cycle. Failures are logged and counted; they
    /// never abort the batch.
    pub fn decode_batch<'a, I>(&self, frames: I) -> DecodedBatch
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut batch = DecodedBatch::default();
        for raw in frames {
            batch.frames += 1;
            match self.decode(raw) {
                Ok(mut messages) => batch.messages.append(&mut messages),
                Err(e) => {
                    batch.failed += 1;
                    debug!(error = %e, len = raw.len(), "Dropping undecodable frame");
                }
            }
        }
        if batch.failed > 0 {
            warn!(
                frames = batch.frames,
                failed = batch.failed,
                "Some frames failed to decode"
            );
        }
        batch
    }
}
