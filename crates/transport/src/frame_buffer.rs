//! Per-cycle accumulation buffer for raw frames
//!
//! Frames are stored back to back at a fixed stride. The buffer starts with
//! room for one block of frames and grows one block at a time, up to a hard
//! byte ceiling.

use crate::error::CapacityError;

/// Default ceiling: 80% of `i32::MAX` bytes
pub const DEFAULT_CEILING_BYTES: usize = (i32::MAX as usize / 10) * 8;

#[derive(Debug)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    lens: Vec<usize>,
    stride: usize,
    block: usize,
    capacity: usize,
    ceiling: usize,
    growths: usize,
}

impl FrameBuffer {
    /// Buffer for frames of at most `stride` bytes, growing by `block`
    /// frames at a time, never larger than `ceiling` bytes.
    pub fn new(stride: usize, block: usize, ceiling: usize) -> Result<Self, CapacityError> {
        let block = block.max(1);
        let initial = stride.saturating_mul(block);
        if initial > ceiling {
            return Err(CapacityError::Ceiling {
                requested: initial,
                ceiling,
            });
        }
        Ok(Self {
            bytes: vec![0u8; initial],
            lens: Vec::with_capacity(block),
            stride,
            block,
            capacity: block,
            ceiling,
            growths: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lens.len() >= self.capacity
    }

    /// Capacity in frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn growths(&self) -> usize {
        self.growths
    }

    fn next_size(&self) -> usize {
        (self.capacity + self.block).saturating_mul(self.stride)
    }

    /// Whether one more block fits under the ceiling.
    pub fn can_grow(&self) -> bool {
        self.next_size() <= self.ceiling
    }

    /// Add one block: allocate the larger region, copy the frames forward,
    /// release the old region.
    pub fn grow(&mut self) -> Result<(), CapacityError> {
        let requested = self.next_size();
        if requested > self.ceiling {
            return Err(CapacityError::Ceiling {
                requested,
                ceiling: self.ceiling,
            });
        }
        let mut grown = vec![0u8; requested];
        let used = self.lens.len() * self.stride;
        grown[..used].copy_from_slice(&self.bytes[..used]);
        self.bytes = grown;
        self.capacity += self.block;
        self.lens.reserve(self.block);
        self.growths += 1;
        Ok(())
    }

    /// Append one frame. The caller grows the buffer first when full.
    pub fn push(&mut self, frame: &[u8]) -> Result<(), CapacityError> {
        if frame.len() > self.stride {
            return Err(CapacityError::FrameTooLarge {
                len: frame.len(),
                stride: self.stride,
            });
        }
        if self.is_full() {
            return Err(CapacityError::Full);
        }
        let offset = self.lens.len() * self.stride;
        self.bytes[offset..offset + frame.len()].copy_from_slice(frame);
        self.lens.push(frame.len());
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let len = *self.lens.get(index)?;
        let offset = index * self.stride;
        Some(&self.bytes[offset..offset + len])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.lens.len()).filter_map(move |i| self.get(i))
    }
}
