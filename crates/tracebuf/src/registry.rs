//! Chained hash map from canonical channel name to trace table slot
//!
//! Chains keep insertion order, newest last, so `add` is a push and lookups
//! walk from the back. A name added twice shadows the older entry until the
//! newer one is removed.

use seisbuf_metadata::ChannelKey;
use tracing::debug;

/// Smallest bucket count used regardless of catalog size
const MIN_BUCKETS: usize = 101;

/// Target load: buckets per expected channel
const BUCKETS_PER_CHANNEL: usize = 4;

#[derive(Debug, Clone)]
struct ChainEntry {
    name: String,
    index: usize,
}

/// Occupancy summary for diagnosing hash distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStats {
    pub buckets: usize,
    pub occupied: usize,
    pub entries: usize,
    pub longest_chain: usize,
}

#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    buckets: Vec<Vec<ChainEntry>>,
    len: usize,
}

impl ChannelRegistry {
    /// Empty registry sized for roughly `expected` channels.
    pub fn with_capacity(expected: usize) -> Self {
        let buckets = next_prime(expected.saturating_mul(BUCKETS_PER_CHANNEL).max(MIN_BUCKETS));
        Self {
            buckets: vec![Vec::new(); buckets],
            len: 0,
        }
    }

    /// Build a registry where each channel maps to its position in `channels`.
    pub fn build(channels: &[ChannelKey]) -> Self {
        let mut registry = Self::with_capacity(channels.len());
        for (index, key) in channels.iter().enumerate() {
            registry.add(&key.canonical(), index);
        }
        let stats = registry.chain_stats();
        debug!(
            channels = channels.len(),
            buckets = stats.buckets,
            longest_chain = stats.longest_chain,
            "Built channel registry"
        );
        registry
    }

    /// Insert at the head of the bucket chain. Duplicates are accepted.
    pub fn add(&mut self, name: &str, index: usize) {
        let bucket = self.bucket_of(name);
        self.buckets[bucket].push(ChainEntry {
            name: name.to_string(),
            index,
        });
        self.len += 1;
    }

    /// Index of the most recently added entry for `name`.
    pub fn contains(&self, name: &str) -> Option<usize> {
        self.buckets[self.bucket_of(name)]
            .iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| entry.index)
    }

    /// Remove the most recently added entry for `name`, returning its index.
    pub fn remove(&mut self, name: &str) -> Option<usize> {
        let bucket = self.bucket_of(name);
        let chain = &mut self.buckets[bucket];
        let position = chain.iter().rposition(|entry| entry.name == name)?;
        self.len -= 1;
        Some(chain.remove(position).index)
    }

    /// Total entries, duplicates included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn chain_stats(&self) -> ChainStats {
        ChainStats {
            buckets: self.buckets.len(),
            occupied: self.buckets.iter().filter(|c| !c.is_empty()).count(),
            entries: self.len,
            longest_chain: self.buckets.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    fn bucket_of(&self, name: &str) -> usize {
        djb2(name) as usize % self.buckets.len()
    }
}

/// Bernstein's string hash: `h = h * 33 + byte`, seeded with 5381.
pub fn djb2(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}
