//! Batch reassembly into per-channel contiguous runs
//!
//! A batch is resolved against the registry, stably sorted by channel then
//! start time, and replayed into the trace table. Consecutive messages whose
//! start time continues the previous sample (within [`GAP_TOLERANCE_SECS`])
//! extend the current chunk; anything else opens a new one.

use tracing::{debug, trace};

use crate::decoder::DecodedMessage;
use crate::error::ReassemblyError;
use crate::registry::ChannelRegistry;
use crate::trace::TraceTable;

/// Maximum start-time discrepancy still treated as continuous
pub const GAP_TOLERANCE_SECS: f64 = 1e-6;

/// Accounting for one reassembly pass. `accepted + skipped == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyReport {
    pub total: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub channels_with_data: usize,
    pub chunks: usize,
}

/// Rebuild `table` from one batch of decoded messages.
///
/// Every trace is reset first, so channels absent from the batch end the
/// cycle empty. On error the table is left partially rebuilt and should be
/// treated as invalid for this cycle.
pub fn reassemble(
    table: &mut TraceTable,
    registry: &ChannelRegistry,
    messages: Vec<DecodedMessage>,
) -> Result<ReassemblyReport, ReassemblyError> {
    let mut report = ReassemblyReport {
        total: messages.len(),
        ..Default::default()
    };

    let mut matched: Vec<(usize, DecodedMessage)> = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.samples.is_empty() && msg.sample_count == 0 {
            trace!(channel = %msg.name, "Skipping message without samples");
            report.skipped += 1;
            continue;
        }
        match registry.contains(&msg.name) {
            Some(index) if index < table.len() => matched.push((index, msg)),
            _ => {
                trace!(channel = %msg.name, "Channel not in registry");
                report.skipped += 1;
            }
        }
    }
    report.accepted = matched.len();

    matched.sort_by(|(_, a), (_, b)| {
        a.key
            .sort_key()
            .cmp(&b.key.sort_key())
            .then(a.start_time.total_cmp(&b.start_time))
    });

    table.reset_all();

    let mut start = 0;
    while start < matched.len() {
        let index = matched[start].0;
        let end = matched[start..]
            .iter()
            .position(|(i, _)| *i != index)
            .map_or(matched.len(), |n| start + n);
        let chunks = fill_trace(table, index, &matched[start..end])?;
        report.channels_with_data += 1;
        report.chunks += chunks;
        start = end;
    }

    debug!(
        total = report.total,
        accepted = report.accepted,
        skipped = report.skipped,
        channels = report.channels_with_data,
        chunks = report.chunks,
        "Reassembled batch"
    );
    Ok(report)
}

/// Load one channel's time-ordered messages into its trace. Returns the
/// number of chunks.
fn fill_trace(
    table: &mut TraceTable,
    index: usize,
    run: &[(usize, DecodedMessage)],
) -> Result<usize, ReassemblyError> {
    // Index was bounds-checked during resolution
    let Some(trace) = table.get_mut(index) else {
        return Ok(0);
    };
    let declared: usize = run.iter().map(|(_, m)| m.sample_count).sum();

    trace.data.reserve_exact(declared);
    trace.times.reserve_exact(declared);

    for (k, (_, msg)) in run.iter().enumerate() {
        if k > 0 {
            let last = trace.times.last().copied().unwrap_or(msg.start_time);
            if (last + msg.dt - msg.start_time).abs() > GAP_TOLERANCE_SECS {
                trace!(
                    channel = %msg.name,
                    expected = last + msg.dt,
                    start = msg.start_time,
                    "Gap opens new chunk"
                );
                trace.chunk_ptr.push(trace.data.len());
            }
        }
        // Last message's interval wins
        trace.dt = Some(msg.dt);
        for (l, &value) in msg.samples.iter().enumerate() {
            trace.data.push(value);
            trace.times.push(msg.start_time + l as f64 * msg.dt);
        }
    }
    trace.chunk_ptr.push(trace.data.len());

    let npts = trace.npts();
    if npts != declared {
        return Err(ReassemblyError::SampleCountMismatch {
            channel: trace.key.canonical(),
            appended: npts,
            declared,
        });
    }
    let boundary = trace.chunk_ptr.last().copied().unwrap_or(0);
    if boundary != npts {
        return Err(ReassemblyError::ChunkBoundary {
            channel: trace.key.canonical(),
            boundary,
            npts,
        });
    }
    Ok(trace.nchunks())
}
