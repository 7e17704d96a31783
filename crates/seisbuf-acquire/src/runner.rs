//! The acquisition cycle: source batch, decode, reassemble, persist

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use seisbuf_metadata::CatalogChannel;
use seisbuf_store::StoreWriter;
use seisbuf_tracebuf::{reassemble, ChannelRegistry, Decoder, ReassemblyReport, TraceTable};
use seisbuf_transport::{
    BatchSource, NatsSource, ReadStatus, ReplaySource, RingSource, SourceBatch, SourceError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::error::AcquireError;
use crate::metrics::AcquireMetrics;

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Ring buffer ceiling hit; the cycle ran on what was gathered
    Degraded,
    /// Nothing arrived; the table was cleared
    Idle,
    /// Reassembly found an inconsistency; the cycle was discarded
    ReassemblyFailed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed => "ok",
            CycleOutcome::Degraded => "ceiling_reached",
            CycleOutcome::Idle => "idle",
            CycleOutcome::ReassemblyFailed => "reassembly_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub outcome: CycleOutcome,
    pub frames: usize,
    pub decode_failures: usize,
    pub report: ReassemblyReport,
    /// Store cycle number, when persisted
    pub stored: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub idle: usize,
    pub degraded: usize,
    pub failed: usize,
    pub frames: usize,
    pub messages: usize,
}

impl RunSummary {
    fn record(&mut self, cycle: &CycleSummary) {
        self.cycles += 1;
        match cycle.outcome {
            CycleOutcome::Completed => {}
            CycleOutcome::Degraded => self.degraded += 1,
            CycleOutcome::Idle => self.idle += 1,
            CycleOutcome::ReassemblyFailed => self.failed += 1,
        }
        self.frames += cycle.frames;
        self.messages += cycle.report.accepted;
    }
}

/// Owns the per-process acquisition state: registry, trace table, decoder
/// and the optional store.
pub struct Acquisition {
    registry: Arc<ChannelRegistry>,
    table: TraceTable,
    decoder: Decoder,
    store: Option<StoreWriter>,
    metrics: AcquireMetrics,
    last_cycle_epoch_secs: Arc<AtomicU64>,
}

impl Acquisition {
    pub fn new(channels: &[CatalogChannel], decoder: Decoder, metrics: AcquireMetrics) -> Self {
        let table = TraceTable::new(channels);
        let registry = Arc::new(ChannelRegistry::build(&table.keys()));
        Self {
            registry,
            table,
            decoder,
            store: None,
            metrics,
            last_cycle_epoch_secs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_store(mut self, store: StoreWriter) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(&self.registry)
    }

    /// Trace table as left by the last cycle
    pub fn table(&self) -> &TraceTable {
        &self.table
    }

    /// Shared with the health endpoint
    pub fn heartbeat(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_cycle_epoch_secs)
    }

    /// Run one cycle over a gathered batch. Only store failures are
    /// returned as errors; decode and reassembly problems are absorbed into
    /// the summary.
    pub fn process(&mut self, batch: &SourceBatch) -> Result<CycleSummary, AcquireError> {
        let now = Utc::now();
        self.metrics.inc_frames_read(batch.read);
        self.metrics.inc_frames_skipped(batch.skipped);
        self.metrics.inc_buffer_growths(batch.growths);

        let mut summary = CycleSummary {
            outcome: CycleOutcome::Idle,
            frames: batch.frames.len(),
            decode_failures: 0,
            report: ReassemblyReport::default(),
            stored: None,
        };

        if batch.frames.is_empty() {
            self.table.reset_all();
            self.finish_cycle(&summary, now.timestamp_millis());
            return Ok(summary);
        }

        let decoded = self.decoder.decode_batch(batch.frame_slices());
        summary.decode_failures = decoded.failed;
        self.metrics.inc_messages_decoded(decoded.messages.len());
        self.metrics.inc_decode_failures(decoded.failed);

        match reassemble(&mut self.table, &self.registry, decoded.messages) {
            Ok(report) => summary.report = report,
            Err(e) => {
                error!(error = %e, frames = summary.frames, "Reassembly failed, discarding cycle");
                self.table.reset_all();
                summary.outcome = CycleOutcome::ReassemblyFailed;
                self.finish_cycle(&summary, now.timestamp_millis());
                return Ok(summary);
            }
        }
        self.metrics.inc_registry_skipped(summary.report.skipped);
        self.metrics.inc_chunks(summary.report.chunks);
        self.metrics
            .set_channels_with_data(summary.report.channels_with_data);

        if let Some(store) = self.store.as_mut() {
            summary.stored = Some(store.write_cycle(&self.table, now)?.cycle);
        }

        summary.outcome = if batch.status == ReadStatus::CeilingReached {
            warn!(
                frames = summary.frames,
                "Buffer ceiling reached, cycle ran on a partial batch"
            );
            CycleOutcome::Degraded
        } else {
            CycleOutcome::Completed
        };
        debug!(
            frames = summary.frames,
            messages = summary.report.total,
            accepted = summary.report.accepted,
            skipped = summary.report.skipped,
            channels = summary.report.channels_with_data,
            chunks = summary.report.chunks,
            stored = ?summary.stored,
            "Cycle complete"
        );
        self.finish_cycle(&summary, now.timestamp_millis());
        Ok(summary)
    }

    fn finish_cycle(&self, summary: &CycleSummary, epoch_millis: i64) {
        self.metrics.inc_cycle(summary.outcome.as_str());
        self.metrics
            .set_last_cycle_timestamp(epoch_millis as f64 / 1000.0);
        self.last_cycle_epoch_secs
            .store((epoch_millis / 1000).max(0) as u64, Ordering::SeqCst);
    }

    /// Cycle until the source terminates, shutdown is requested, or a source
    /// or store error occurs. The source and store are closed either way.
    pub async fn run(
        &mut self,
        source: &mut dyn BatchSource,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AcquireError> {
        let name = source.name();
        info!(
            source = name,
            channels = self.table.len(),
            storing = self.store.is_some(),
            "Acquisition loop running"
        );

        let mut summary = RunSummary::default();
        let result = self.cycle_loop(source, cancel, &mut summary).await;

        if let Err(e) = source.close().await {
            warn!(source = name, error = %e, "Failed to close source");
        }
        let closed = match self.store.as_mut() {
            Some(store) => store.close(),
            None => Ok(()),
        };
        result?;
        closed?;

        info!(
            source = name,
            cycles = summary.cycles,
            idle = summary.idle,
            degraded = summary.degraded,
            failed = summary.failed,
            frames = summary.frames,
            messages = summary.messages,
            "Acquisition loop stopped"
        );
        Ok(summary)
    }

    async fn cycle_loop(
        &mut self,
        source: &mut dyn BatchSource,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), AcquireError> {
        let mut last_stats = Instant::now();
        loop {
            if cancel.is_cancelled() {
                info!("Shutdown requested");
                return Ok(());
            }

            let batch = source.next_batch(cancel).await?;
            let terminated = batch.status == ReadStatus::Terminated;

            // A terminating source may still hand over its last frames
            if !(terminated && batch.read == 0) {
                let cycle = self.process(&batch)?;
                summary.record(&cycle);
            }

            if terminated {
                info!(source = source.name(), "Source terminated");
                return Ok(());
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                info!(
                    source = source.name(),
                    cycles = summary.cycles,
                    frames = summary.frames,
                    messages = summary.messages,
                    failed = summary.failed,
                    "Acquisition stats"
                );
                last_stats = Instant::now();
            }
        }
    }
}

/// Open the configured transport. The ring source filters frames against
/// `registry` before they are copied out.
pub async fn open_source(
    config: &SourceConfig,
    registry: Arc<ChannelRegistry>,
) -> Result<Box<dyn BatchSource>, SourceError> {
    let source: Box<dyn BatchSource> = match config {
        SourceConfig::Ring(ring) => Box::new(RingSource::open(ring, registry)?),
        SourceConfig::Nats(nats) => Box::new(NatsSource::connect(nats).await?),
        SourceConfig::Replay(replay) => Box::new(ReplaySource::open(replay).await?),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use seisbuf_metadata::{ChannelCatalog, Station};
    use seisbuf_tracebuf::JsonDecoder;

    fn channels() -> Vec<CatalogChannel> {
        ChannelCatalog {
            stations: vec![Station {
                network: "PW".to_string(),
                station: "P373".to_string(),
                channel_prefix: "LY".to_string(),
                location: "00".to_string(),
                latitude: 45.0,
                longitude: -122.0,
                elevation: 0.0,
                gain: 1.0,
            }],
        }
        .channels()
        .unwrap()
    }

    fn position(time_ms: i64) -> Bytes {
        Bytes::from(format!(
            r#"{{"time": {time_ms}, "Q": 1, "SNCL": "P373.PW.LY_.00",
                "coor": [0.1, 0.2, 0.3], "err": [0.01, 0.02, 0.03]}}"#
        ))
    }

    fn acquisition(label: &str) -> Acquisition {
        Acquisition::new(
            &channels(),
            Decoder::Json(JsonDecoder),
            AcquireMetrics::new(label),
        )
    }

    fn batch(frames: Vec<Bytes>, status: ReadStatus) -> SourceBatch {
        let mut batch = SourceBatch::empty(status);
        batch.read = frames.len();
        batch.frames = frames;
        batch
    }

    #[test]
    fn test_process_builds_table() {
        let mut acq = acquisition("runner-process");
        let summary = acq
            .process(&batch(
                vec![position(2_000), position(1_000), b"garbage".as_slice().into()],
                ReadStatus::Drained,
            ))
            .unwrap();

        assert_eq!(summary.outcome, CycleOutcome::Completed);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.report.accepted, 14);
        assert_eq!(summary.report.channels_with_data, 7);
        assert_eq!(summary.stored, None);

        let up = acq.table().get(0).unwrap();
        assert_eq!(up.times, vec![1.0, 2.0]);
        assert_eq!(up.chunk_ptr, vec![0, 2]);
        assert!(acq.heartbeat().load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_empty_batch_clears_table() {
        let mut acq = acquisition("runner-idle");
        acq.process(&batch(vec![position(1_000)], ReadStatus::Drained))
            .unwrap();
        assert_eq!(acq.table().with_data().count(), 7);

        let summary = acq
            .process(&batch(Vec::new(), ReadStatus::Drained))
            .unwrap();
        assert_eq!(summary.outcome, CycleOutcome::Idle);
        assert_eq!(acq.table().with_data().count(), 0);
    }

    #[test]
    fn test_ceiling_marks_cycle_degraded() {
        let mut acq = acquisition("runner-ceiling");
        let summary = acq
            .process(&batch(vec![position(1_000)], ReadStatus::CeilingReached))
            .unwrap();
        assert_eq!(summary.outcome, CycleOutcome::Degraded);
        assert_eq!(summary.report.channels_with_data, 7);
    }

    #[tokio::test]
    async fn test_run_until_source_terminates() {
        let mut acq = acquisition("runner-run");
        let mut source = ReplaySource::from_frames(
            vec![position(1_000), position(2_000), position(3_000)],
            2,
        );

        let summary = acq
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.messages, 21);

        // The last cycle held only the third message
        let up = acq.table().get(0).unwrap();
        assert_eq!(up.times, vec![3.0]);
    }

    #[tokio::test]
    async fn test_cancelled_run_does_no_cycles() {
        let mut acq = acquisition("runner-cancel");
        let mut source = ReplaySource::from_frames(vec![position(1_000)], 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = acq.run(&mut source, &cancel).await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(source.remaining(), 1);
    }
}
