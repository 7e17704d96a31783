use std::fs::{self, File};
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use seisbuf_tracebuf::{Trace, TraceTable};
use tracing::debug;

use crate::error::StoreError;
use crate::manifest::StoreManifest;
use crate::schema::batch_to_traces;
use crate::writer::cycle_dir_name;

/// All traces of one cycle sharing a sampling interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceGroup {
    pub dt: f64,
    pub traces: Vec<Trace>,
}

pub struct StoreReader {
    root: PathBuf,
    manifest: Option<StoreManifest>,
}

impl StoreReader {
    pub(crate) fn open(root: &Path) -> Result<Self, StoreError> {
        if !root.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            manifest: StoreManifest::load(root)?,
        })
    }

    /// Manifest, if the writer was closed cleanly
    pub fn manifest(&self) -> Option<&StoreManifest> {
        self.manifest.as_ref()
    }

    /// Stored cycle numbers, ascending. Scans the directory so cycles from an
    /// unclosed writer are listed too.
    pub fn cycles(&self) -> Result<Vec<u64>, StoreError> {
        list_cycles(&self.root)
    }

    /// Groups of one cycle in ascending `dt`.
    pub fn read_cycle(&self, cycle: u64) -> Result<Vec<TraceGroup>, StoreError> {
        let dir = self.root.join(cycle_dir_name(cycle));
        if !dir.is_dir() {
            return Err(StoreError::CycleNotFound(cycle));
        }

        let mut files: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let micros = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("dt_"))
                .and_then(|n| n.strip_suffix(".parquet"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(micros) = micros {
                files.push((micros, path));
            }
        }
        files.sort_unstable_by_key(|(micros, _)| *micros);

        let mut groups = Vec::with_capacity(files.len());
        for (micros, path) in files {
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
            let mut traces = Vec::new();
            for batch in reader {
                traces.extend(batch_to_traces(&batch?)?);
            }
            debug!(cycle, file = %path.display(), traces = traces.len(), "Read group");
            groups.push(TraceGroup {
                dt: micros as f64 / 1e6,
                traces,
            });
        }
        Ok(groups)
    }

    /// Replace the matching traces of `table` with a stored cycle. Traces
    /// not in the cycle are reset. Returns how many traces were loaded.
    pub fn load_cycle_into(&self, cycle: u64, table: &mut TraceTable) -> Result<usize, StoreError> {
        let groups = self.read_cycle(cycle)?;
        table.reset_all();

        let keys = table.keys();
        let mut loaded = 0;
        for stored in groups.into_iter().flat_map(|g| g.traces) {
            let Some(index) = keys.iter().position(|k| *k == stored.key) else {
                debug!(channel = %stored.key, "Stored trace not in table");
                continue;
            };
            if let Some(trace) = table.get_mut(index) {
                trace.dt = stored.dt;
                trace.times = stored.times;
                trace.data = stored.data;
                trace.chunk_ptr = stored.chunk_ptr;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Release the reader. Provided for symmetry with the writer; dropping
    /// has the same effect.
    pub fn close(self) {}
}

pub(crate) fn list_cycles(root: &Path) -> Result<Vec<u64>, StoreError> {
    let mut cycles = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(n) = name
            .to_str()
            .and_then(|s| s.strip_prefix("cycle_"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            cycles.push(n);
        }
    }
    cycles.sort_unstable();
    Ok(cycles)
}
