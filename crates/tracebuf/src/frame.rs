//! tracebuf2 binary waveform frames
//!
//! A 64-byte header followed by `nsamp` integer samples. The two-character
//! data type (`i4`, `i2`, `s4`, `s2`) selects byte order and sample width for
//! both the header numerics and the payload.

use seisbuf_metadata::{ChannelKey, CHANNEL_LEN, LOCATION_LEN, NETWORK_LEN, STATION_LEN};

use crate::error::DecodeError;

/// Header length in bytes
pub const FRAME_HEADER_LEN: usize = 64;

/// Largest frame accepted from any transport
pub const MAX_FRAME_SIZE: usize = 4096;

const OFF_PINNO: usize = 0;
const OFF_NSAMP: usize = 4;
const OFF_START: usize = 8;
const OFF_END: usize = 16;
const OFF_RATE: usize = 24;
const OFF_STA: usize = 32;
const OFF_NET: usize = 39;
const OFF_CHAN: usize = 48;
const OFF_LOC: usize = 52;
const OFF_VERSION: usize = 55;
const OFF_DATATYPE: usize = 57;
const OFF_QUALITY: usize = 60;

// Field widths include the NUL terminator
const STA_FIELD: usize = STATION_LEN + 1;
const NET_FIELD: usize = NETWORK_LEN + 1;
const CHAN_FIELD: usize = CHANNEL_LEN + 1;
const LOC_FIELD: usize = LOCATION_LEN + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    Two,
    Four,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::Two => 2,
            SampleWidth::Four => 4,
        }
    }
}

/// Map a datatype code to its byte order and width.
fn parse_datatype(code: &[u8]) -> Result<(ByteOrder, SampleWidth), DecodeError> {
    match code {
        b"i4" => Ok((ByteOrder::Little, SampleWidth::Four)),
        b"i2" => Ok((ByteOrder::Little, SampleWidth::Two)),
        b"s4" => Ok((ByteOrder::Big, SampleWidth::Four)),
        b"s2" => Ok((ByteOrder::Big, SampleWidth::Two)),
        other => Err(DecodeError::UnknownDataType(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

fn datatype_code(order: ByteOrder, width: SampleWidth) -> &'static [u8; 2] {
    match (order, width) {
        (ByteOrder::Little, SampleWidth::Four) => b"i4",
        (ByteOrder::Little, SampleWidth::Two) => b"i2",
        (ByteOrder::Big, SampleWidth::Four) => b"s4",
        (ByteOrder::Big, SampleWidth::Two) => b"s2",
    }
}

/// Decoded frame with numerics in native order.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub pin: i32,
    pub key: ChannelKey,
    pub start_time: f64,
    pub end_time: f64,
    pub sample_rate: f64,
    pub byte_order: ByteOrder,
    pub width: SampleWidth,
    pub quality: [u8; 2],
    pub samples: Vec<i32>,
}

impl TraceFrame {
    /// Decode only the channel key. Used by the ring reader to filter frames
    /// before keeping them.
    pub fn peek_key(buf: &[u8]) -> Result<ChannelKey, DecodeError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::Truncated {
                need: FRAME_HEADER_LEN,
                have: buf.len(),
            });
        }
        header_key(buf)
    }

    /// Total length of the frame starting at `buf`, from its header alone.
    /// Used to split files of back-to-back frames.
    pub fn encoded_len(buf: &[u8]) -> Result<usize, DecodeError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::Truncated {
                need: FRAME_HEADER_LEN,
                have: buf.len(),
            });
        }
        let (order, width) = parse_datatype(&buf[OFF_DATATYPE..OFF_DATATYPE + 2])?;
        let nsamp = Reader { buf, order }.i32_at(OFF_NSAMP);
        if nsamp <= 0 {
            return Err(DecodeError::InvalidSampleCount(nsamp));
        }
        Ok(FRAME_HEADER_LEN + nsamp as usize * width.bytes())
    }

    /// Parse a full frame of at most `max_len` bytes.
    pub fn parse(buf: &[u8], max_len: usize) -> Result<Self, DecodeError> {
        if buf.len() > max_len {
            return Err(DecodeError::Oversize {
                len: buf.len(),
                max: max_len,
            });
        }
        if buf.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::Truncated {
                need: FRAME_HEADER_LEN,
                have: buf.len(),
            });
        }

        let (byte_order, width) = parse_datatype(&buf[OFF_DATATYPE..OFF_DATATYPE + 2])?;
        let r = Reader {
            buf,
            order: byte_order,
        };

        let nsamp = r.i32_at(OFF_NSAMP);
        if nsamp <= 0 {
            return Err(DecodeError::InvalidSampleCount(nsamp));
        }
        let sample_rate = r.f64_at(OFF_RATE);
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DecodeError::InvalidSampleRate(sample_rate));
        }

        let start_time = r.f64_at(OFF_START);
        if !start_time.is_finite() {
            return Err(DecodeError::InvalidStartTime(start_time));
        }

        let count = nsamp as usize;
        let need = FRAME_HEADER_LEN + count * width.bytes();
        if buf.len() < need {
            return Err(DecodeError::Truncated {
                need,
                have: buf.len(),
            });
        }

        let samples = (0..count)
            .map(|i| {
                let off = FRAME_HEADER_LEN + i * width.bytes();
                match width {
                    SampleWidth::Four => r.i32_at(off),
                    SampleWidth::Two => i32::from(r.i16_at(off)),
                }
            })
            .collect();

        Ok(Self {
            pin: r.i32_at(OFF_PINNO),
            key: header_key(buf)?,
            start_time,
            end_time: r.f64_at(OFF_END),
            sample_rate,
            byte_order,
            width,
            quality: [buf[OFF_QUALITY], buf[OFF_QUALITY + 1]],
            samples,
        })
    }

    /// Sampling interval in seconds
    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Serialize in the frame's own byte order and width. Samples that do
    /// not fit a two-byte frame are truncated to their low 16 bits.
    pub fn encode(&self) -> Vec<u8> {
        let w = self.width.bytes();
        let mut buf = vec![0u8; FRAME_HEADER_LEN + self.samples.len() * w];
        let order = self.byte_order;

        put(&mut buf, OFF_PINNO, &i32_bytes(self.pin, order));
        put(&mut buf, OFF_NSAMP, &i32_bytes(self.samples.len() as i32, order));
        put(&mut buf, OFF_START, &f64_bytes(self.start_time, order));
        put(&mut buf, OFF_END, &f64_bytes(self.end_time, order));
        put(&mut buf, OFF_RATE, &f64_bytes(self.sample_rate, order));
        put(&mut buf, OFF_STA, self.key.station().as_bytes());
        put(&mut buf, OFF_NET, self.key.network().as_bytes());
        put(&mut buf, OFF_CHAN, self.key.channel().as_bytes());
        put(&mut buf, OFF_LOC, self.key.location().as_bytes());
        put(&mut buf, OFF_VERSION, b"20");
        put(&mut buf, OFF_DATATYPE, datatype_code(order, self.width));
        put(&mut buf, OFF_QUALITY, &self.quality);

        for (i, &s) in self.samples.iter().enumerate() {
            let off = FRAME_HEADER_LEN + i * w;
            match self.width {
                SampleWidth::Four => put(&mut buf, off, &i32_bytes(s, order)),
                SampleWidth::Two => {
                    let v = s as i16;
                    let b = match order {
                        ByteOrder::Little => v.to_le_bytes(),
                        ByteOrder::Big => v.to_be_bytes(),
                    };
                    put(&mut buf, off, &b);
                }
            }
        }
        buf
    }
}

fn header_key(buf: &[u8]) -> Result<ChannelKey, DecodeError> {
    let sta = c_str(&buf[OFF_STA..OFF_STA + STA_FIELD]);
    let net = c_str(&buf[OFF_NET..OFF_NET + NET_FIELD]);
    let chan = c_str(&buf[OFF_CHAN..OFF_CHAN + CHAN_FIELD]);
    let loc = c_str(&buf[OFF_LOC..OFF_LOC + LOC_FIELD]);
    Ok(ChannelKey::new(sta, net, chan, loc)?)
}

/// NUL-terminated field as a str; invalid UTF-8 yields a string the key
/// validator rejects.
fn c_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("\u{fffd}")
}

fn put(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

fn i32_bytes(v: i32, order: ByteOrder) -> [u8; 4] {
    match order {
        ByteOrder::Little => v.to_le_bytes(),
        ByteOrder::Big => v.to_be_bytes(),
    }
}

fn f64_bytes(v: f64, order: ByteOrder) -> [u8; 8] {
    match order {
        ByteOrder::Little => v.to_le_bytes(),
        ByteOrder::Big => v.to_be_bytes(),
    }
}

/// Bounds are checked by the caller before any read.
struct Reader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl Reader<'_> {
    fn array<const N: usize>(&self, off: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[off..off + N]);
        out
    }

    fn i16_at(&self, off: usize) -> i16 {
        let b = self.array::<2>(off);
        match self.order {
            ByteOrder::Little => i16::from_le_bytes(b),
            ByteOrder::Big => i16::from_be_bytes(b),
        }
    }

    fn i32_at(&self, off: usize) -> i32 {
        let b = self.array::<4>(off);
        match self.order {
            ByteOrder::Little => i32::from_le_bytes(b),
            ByteOrder::Big => i32::from_be_bytes(b),
        }
    }

    fn f64_at(&self, off: usize) -> f64 {
        let b = self.array::<8>(off);
        match self.order {
            ByteOrder::Little => f64::from_le_bytes(b),
            ByteOrder::Big => f64::from_be_bytes(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(order: ByteOrder, width: SampleWidth) -> TraceFrame {
        TraceFrame {
            pin: 7,
            key: ChannelKey::new("YYYY", "XX", "HNZ", "00").unwrap(),
            start_time: 1_700_000_000.5,
            end_time: 1_700_000_000.53,
            sample_rate: 100.0,
            byte_order: order,
            width,
            quality: [0, 0],
            samples: vec![1, -2, 300, -4000],
        }
    }

    #[test]
    fn test_header_layout() {
        let buf = frame(ByteOrder::Little, SampleWidth::Four).encode();
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 16);
        assert_eq!(&buf[4..8], &4i32.to_le_bytes());
        assert_eq!(&buf[32..36], b"YYYY");
        assert_eq!(&buf[39..41], b"XX");
        assert_eq!(&buf[48..51], b"HNZ");
        assert_eq!(&buf[52..54], b"00");
        assert_eq!(&buf[57..59], b"i4");
    }

    #[test]
    fn test_big_endian_normalized() {
        let original = frame(ByteOrder::Big, SampleWidth::Four);
        let buf = original.encode();
        assert_eq!(&buf[4..8], &4i32.to_be_bytes());

        let parsed = TraceFrame::parse(&buf, MAX_FRAME_SIZE).unwrap();
        assert_eq!(parsed.samples, vec![1, -2, 300, -4000]);
        assert_eq!(parsed.start_time, 1_700_000_000.5);
        assert_eq!(parsed.byte_order, ByteOrder::Big);
        assert!((parsed.dt() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_two_byte_samples() {
        let buf = frame(ByteOrder::Big, SampleWidth::Two).encode();
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 8);
        let parsed = TraceFrame::parse(&buf, MAX_FRAME_SIZE).unwrap();
        assert_eq!(parsed.samples, vec![1, -2, 300, -4000]);
        assert_eq!(parsed.width, SampleWidth::Two);
    }

    #[test]
    fn test_oversize_rejected() {
        let mut f = frame(ByteOrder::Little, SampleWidth::Four);
        f.samples = vec![0; 1100];
        let buf = f.encode();
        assert!(matches!(
            TraceFrame::parse(&buf, MAX_FRAME_SIZE),
            Err(DecodeError::Oversize { max: MAX_FRAME_SIZE, .. })
        ));
    }

    #[test]
    fn test_unknown_datatype_rejected() {
        let mut buf = frame(ByteOrder::Little, SampleWidth::Four).encode();
        buf[57..59].copy_from_slice(b"f4");
        assert!(matches!(
            TraceFrame::parse(&buf, MAX_FRAME_SIZE),
            Err(DecodeError::UnknownDataType(t)) if t == "f4"
        ));
    }

    #[test]
    fn test_short_payload_rejected() {
        let buf = frame(ByteOrder::Little, SampleWidth::Four).encode();
        assert!(matches!(
            TraceFrame::parse(&buf[..buf.len() - 3], MAX_FRAME_SIZE),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            TraceFrame::parse(&buf[..40], MAX_FRAME_SIZE),
            Err(DecodeError::Truncated { need: FRAME_HEADER_LEN, have: 40 })
        ));
    }

    #[test]
    fn test_bad_rate_and_count_rejected() {
        let mut f = frame(ByteOrder::Little, SampleWidth::Four);
        f.sample_rate = 0.0;
        assert!(matches!(
            TraceFrame::parse(&f.encode(), MAX_FRAME_SIZE),
            Err(DecodeError::InvalidSampleRate(_))
        ));

        let mut buf = frame(ByteOrder::Little, SampleWidth::Four).encode();
        buf[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            TraceFrame::parse(&buf, MAX_FRAME_SIZE),
            Err(DecodeError::InvalidSampleCount(-1))
        ));
    }

    #[test]
    fn test_encoded_len_from_header() {
        let buf = frame(ByteOrder::Big, SampleWidth::Two).encode();
        assert_eq!(TraceFrame::encoded_len(&buf).unwrap(), buf.len());
        assert_eq!(TraceFrame::encoded_len(&buf[..FRAME_HEADER_LEN]).unwrap(), buf.len());
    }

    #[test]
    fn test_peek_key_keeps_location_as_written() {
        let mut f = frame(ByteOrder::Little, SampleWidth::Four);
        f.key = ChannelKey::new("YYYY", "XX", "HNZ", "").unwrap();
        let mut buf = f.encode();
        assert_eq!(TraceFrame::peek_key(&buf).unwrap().canonical(), "XX.YYYY.HNZ.");

        buf[52..54].copy_from_slice(b"--");
        let key = TraceFrame::peek_key(&buf).unwrap();
        assert_eq!(key.location(), "--");
        assert_eq!(key, ChannelKey::new("YYYY", "XX", "HNZ", "--").unwrap());
    }

    #[test]
    fn test_non_finite_start_time_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut f = frame(ByteOrder::Big, SampleWidth::Four);
            f.start_time = bad;
            assert!(matches!(
                TraceFrame::parse(&f.encode(), MAX_FRAME_SIZE),
                Err(DecodeError::InvalidStartTime(_))
            ));
        }
    }
}
