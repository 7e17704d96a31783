//! Prometheus metrics for the acquisition loop
//!
//! Every series carries the source kind (ring, nats, replay) as a label.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_int_counter_vec, register_int_gauge_vec, Encoder, GaugeVec,
    IntCounterVec, IntGaugeVec, TextEncoder,
};

const LABEL_SOURCE: &str = "source";
const LABEL_OUTCOME: &str = "outcome";

/// Frames received from the transport
static FRAMES_READ_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_frames_read_total",
        "Total frames received from the transport",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register frames_read_total metric")
});

/// Frames dropped before decoding
static FRAMES_SKIPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_frames_skipped_total",
        "Total frames dropped before decoding (filtered or oversize)",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register frames_skipped_total metric")
});

static MESSAGES_DECODED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_messages_decoded_total",
        "Total per-channel messages produced by the decoder",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register messages_decoded_total metric")
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_decode_failures_total",
        "Total frames that failed to decode",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register decode_failures_total metric")
});

/// Messages whose channel is not in the registry
static REGISTRY_SKIPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_registry_skipped_total",
        "Total decoded messages skipped during reassembly",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register registry_skipped_total metric")
});

static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_cycles_total",
        "Total acquisition cycles by outcome",
        &[LABEL_SOURCE, LABEL_OUTCOME]
    )
    .expect("Failed to register cycles_total metric")
});

static CHUNKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_chunks_total",
        "Total contiguous sample runs built",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register chunks_total metric")
});

static BUFFER_GROWTHS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seisbuf_buffer_growths_total",
        "Total accumulation buffer growths",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register buffer_growths_total metric")
});

static CHANNELS_WITH_DATA: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "seisbuf_channels_with_data",
        "Channels holding samples after the last cycle",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register channels_with_data metric")
});

/// Last completed cycle (epoch seconds)
static LAST_CYCLE_TIMESTAMP: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "seisbuf_last_cycle_timestamp",
        "Unix timestamp of the last acquisition cycle",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register last_cycle_timestamp metric")
});

/// Handle for recording metrics of one acquisition loop
#[derive(Clone)]
pub struct AcquireMetrics {
    source: String,
}

impl AcquireMetrics {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn inc_frames_read(&self, n: usize) {
        FRAMES_READ_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_frames_skipped(&self, n: usize) {
        FRAMES_SKIPPED_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_messages_decoded(&self, n: usize) {
        MESSAGES_DECODED_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_decode_failures(&self, n: usize) {
        DECODE_FAILURES_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_registry_skipped(&self, n: usize) {
        REGISTRY_SKIPPED_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_cycle(&self, outcome: &str) {
        CYCLES_TOTAL
            .with_label_values(&[&self.source, outcome])
            .inc();
    }

    pub fn inc_chunks(&self, n: usize) {
        CHUNKS_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn inc_buffer_growths(&self, n: usize) {
        BUFFER_GROWTHS_TOTAL
            .with_label_values(&[&self.source])
            .inc_by(n as u64);
    }

    pub fn set_channels_with_data(&self, n: usize) {
        CHANNELS_WITH_DATA
            .with_label_values(&[&self.source])
            .set(n as i64);
    }

    pub fn set_last_cycle_timestamp(&self, epoch_secs: f64) {
        LAST_CYCLE_TIMESTAMP
            .with_label_values(&[&self.source])
            .set(epoch_secs);
    }

    pub fn get_cycles(&self, outcome: &str) -> u64 {
        CYCLES_TOTAL
            .with_label_values(&[&self.source, outcome])
            .get()
    }

    pub fn get_frames_read(&self) -> u64 {
        FRAMES_READ_TOTAL.with_label_values(&[&self.source]).get()
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_per_source() {
        let metrics = AcquireMetrics::new("metrics-test");
        metrics.inc_frames_read(5);
        metrics.inc_frames_read(2);
        metrics.inc_frames_skipped(1);
        metrics.inc_messages_decoded(42);
        metrics.inc_decode_failures(1);
        metrics.inc_registry_skipped(7);
        metrics.inc_chunks(3);
        metrics.inc_buffer_growths(1);
        metrics.inc_cycle("ok");
        metrics.set_channels_with_data(14);
        metrics.set_last_cycle_timestamp(1_700_000_000.0);

        assert_eq!(metrics.get_frames_read(), 7);
        assert_eq!(metrics.get_cycles("ok"), 1);
        assert_eq!(metrics.get_cycles("reassembly_failed"), 0);
    }

    #[test]
    fn test_encode_metrics() {
        AcquireMetrics::new("encode-test").inc_cycle("idle");
        let body = encode_metrics().unwrap();
        assert!(body.contains("seisbuf_cycles_total"));
    }
}
