use seisbuf_metadata::{CatalogChannel, ChannelKey, ChannelMetadata};

/// Per-channel sample state rebuilt every cycle.
///
/// `chunk_ptr` has `nchunks + 1` entries: chunk `i` spans
/// `data[chunk_ptr[i]..chunk_ptr[i + 1]]`. An empty trace has `chunk_ptr == [0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub key: ChannelKey,
    pub metadata: ChannelMetadata,
    /// Sampling interval; unset until the first message of a cycle
    pub dt: Option<f64>,
    pub data: Vec<f64>,
    /// Epoch seconds, one per sample
    pub times: Vec<f64>,
    pub chunk_ptr: Vec<usize>,
}

impl Trace {
    pub fn new(key: ChannelKey, metadata: ChannelMetadata) -> Self {
        Self {
            key,
            metadata,
            dt: None,
            data: Vec::new(),
            times: Vec::new(),
            chunk_ptr: vec![0],
        }
    }

    /// Drop this cycle's samples, keeping identity.
    pub fn reset(&mut self) {
        self.dt = None;
        self.data = Vec::new();
        self.times = Vec::new();
        self.chunk_ptr = vec![0];
    }

    pub fn npts(&self) -> usize {
        self.data.len()
    }

    pub fn nchunks(&self) -> usize {
        self.chunk_ptr.len().saturating_sub(1)
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Iterate `(times, data)` slices of each contiguous run.
    pub fn chunks(&self) -> impl Iterator<Item = (&[f64], &[f64])> + '_ {
        self.chunk_ptr
            .windows(2)
            .map(move |w| (&self.times[w[0]..w[1]], &self.data[w[0]..w[1]]))
    }
}

/// Fixed, ordered set of traces for one session. Slot `i` belongs to the
/// `i`th channel of the catalog.
#[derive(Debug, Clone, Default)]
pub struct TraceTable {
    traces: Vec<Trace>,
}

impl TraceTable {
    pub fn new(channels: &[CatalogChannel]) -> Self {
        Self {
            traces: channels
                .iter()
                .map(|c| Trace::new(c.key, c.metadata))
                .collect(),
        }
    }

    pub fn keys(&self) -> Vec<ChannelKey> {
        self.traces.iter().map(|t| t.key).collect()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Trace> {
        self.traces.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Trace> {
        self.traces.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    pub fn reset_all(&mut self) {
        for trace in &mut self.traces {
            trace.reset();
        }
    }

    pub fn with_data(&self) -> impl Iterator<Item = &Trace> + '_ {
        self.traces.iter().filter(|t| t.has_data())
    }
}

impl<'a> IntoIterator for &'a TraceTable {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}
