use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use seisbuf_tracebuf::{Trace, TraceTable};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::manifest::{CycleEntry, GroupEntry, StoreManifest};
use crate::reader::list_cycles;
use crate::schema::traces_to_batch;

/// Sampling interval in whole microseconds; groups and file names use it so
/// float noise never splits a group.
pub fn dt_micros(dt: f64) -> u64 {
    (dt * 1e6).round() as u64
}

pub fn cycle_dir_name(cycle: u64) -> String {
    format!("cycle_{}", cycle)
}

/// Appends one directory of Parquet files per acquisition cycle.
pub struct StoreWriter {
    root: PathBuf,
    manifest: StoreManifest,
    next_cycle: u64,
    closed: bool,
}

impl StoreWriter {
    pub(crate) fn create(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        let manifest = match StoreManifest::load(root)? {
            Some(m) => m,
            None => StoreManifest::new(Utc::now()),
        };
        // Cycles left by a writer that never closed count too
        let on_disk = list_cycles(root)?.last().map_or(0, |c| c + 1);
        let next_cycle = manifest.next_cycle().max(on_disk);
        info!(root = %root.display(), next_cycle, "Opened trace store for writing");
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            next_cycle,
            closed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist every trace with data, one file per sampling interval.
    /// A table with no data still records an (empty) cycle.
    pub fn write_cycle(
        &mut self,
        table: &TraceTable,
        at: DateTime<Utc>,
    ) -> Result<CycleEntry, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let cycle = self.next_cycle;
        let dir = self.root.join(cycle_dir_name(cycle));
        fs::create_dir_all(&dir)?;

        let mut groups: BTreeMap<u64, Vec<&Trace>> = BTreeMap::new();
        for trace in table.with_data() {
            match trace.dt {
                Some(dt) if dt > 0.0 => groups.entry(dt_micros(dt)).or_default().push(trace),
                _ => warn!(channel = %trace.key, "Trace has data but no sampling interval"),
            }
        }

        let mut entries = Vec::with_capacity(groups.len());
        for (micros, traces) in &groups {
            let dt = *micros as f64 / 1e6;
            entries.push(write_group(&dir, *micros, dt, traces)?);
        }

        let entry = CycleEntry {
            cycle,
            written_at: at,
            groups: entries,
        };
        debug!(cycle, groups = entry.groups.len(), "Wrote cycle");
        self.manifest.cycles.push(entry.clone());
        self.next_cycle += 1;
        Ok(entry)
    }

    /// Write the manifest. Further writes fail.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.manifest.save(&self.root)?;
        info!(
            root = %self.root.display(),
            cycles = self.manifest.cycles.len(),
            "Closed trace store"
        );
        Ok(())
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, root = %self.root.display(), "Failed to close trace store");
        }
    }
}

fn write_group(dir: &Path, micros: u64, dt: f64, traces: &[&Trace]) -> Result<GroupEntry, StoreError> {
    let batch = traces_to_batch(traces, dt)?;

    let filename = format!("dt_{}.parquet", micros);
    let tmp_path = dir.join(format!("{}.tmp", filename));
    let final_path = dir.join(&filename);

    let file = File::create(&tmp_path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_created_by("seisbuf-store".to_string())
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    // Atomic rename from .tmp to final name
    fs::rename(&tmp_path, &final_path)?;

    Ok(GroupEntry {
        file: filename,
        dt,
        traces: traces.len() as u64,
        samples: traces.iter().map(|t| t.npts() as u64).sum(),
        bytes: fs::metadata(&final_path)?.len(),
    })
}
