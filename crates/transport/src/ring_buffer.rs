//! SPSC memory-mapped ring shared between a producer process and the reader
//!
//! The region starts with a 64-byte header (magic, geometry, terminate flag
//! and the two positions) followed by fixed-size slots. Positions and the
//! terminate flag live in the mapping so both processes see them; no locks
//! on the hot path, just atomic positions.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use memmap2::MmapRaw;
use tracing::info;

use crate::error::RingError;

/// Identifies a ring region ("SEISRING")
pub const RING_MAGIC: u64 = u64::from_le_bytes(*b"SEISRING");

pub const RING_VERSION: u32 = 1;

/// Size of each message slot (4KB)
pub const SLOT_SIZE: usize = 4096;

/// Region header length
pub const REGION_HEADER_LEN: usize = 64;

/// Slot kind for tracebuf2 waveform frames
pub const FRAME_KIND_TRACEBUF2: u32 = 19;

const OFF_TERMINATE: usize = 24;
const OFF_WRITE_POS: usize = 32;
const OFF_READ_POS: usize = 40;

/// Static part of the region header. The atomics at offsets 24..48 are
/// accessed in place, never through this struct after creation.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RegionHeader {
    magic: u64,
    version: u32,
    slot_size: u32,
    slots: u64,
    terminate: u64,
    write_pos: u64,
    read_pos: u64,
    reserved: [u64; 2],
}

/// Header at the start of each slot
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SlotHeader {
    /// Payload length in bytes
    pub len: u32,
    /// Frame kind, e.g. [`FRAME_KIND_TRACEBUF2`]
    pub kind: u32,
}

/// Largest payload a slot can carry
pub const MAX_PAYLOAD: usize = SLOT_SIZE - std::mem::size_of::<SlotHeader>();

/// A frame copied out of the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub kind: u32,
    pub data: Vec<u8>,
}

/// SPSC ring buffer backed by a memory-mapped file
pub struct RingBuffer {
    path: PathBuf,
    mmap: MmapRaw,
    slots: u64,
}

impl RingBuffer {
    /// Create (or truncate) a ring region with `slots` slots.
    pub fn create(path: &Path, slots: usize) -> Result<Self, RingError> {
        if slots == 0 {
            return Err(RingError::Geometry {
                path: path.to_path_buf(),
                detail: "slot count must be positive".to_string(),
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((REGION_HEADER_LEN + slots * SLOT_SIZE) as u64)?;

        let mmap = MmapRaw::map_raw(&file)?;
        let header = RegionHeader {
            magic: RING_MAGIC,
            version: RING_VERSION,
            slot_size: SLOT_SIZE as u32,
            slots: slots as u64,
            terminate: 0,
            write_pos: 0,
            read_pos: 0,
            reserved: [0; 2],
        };
        let bytes = bytemuck::bytes_of(&header);
        // SAFETY: the mapping is at least REGION_HEADER_LEN bytes and nobody
        // else has it open yet
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mmap.as_mut_ptr(), bytes.len());
        }

        info!(path = %path.display(), slots, "Created ring region");
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            slots: slots as u64,
        })
    }

    /// Attach to an existing ring region, validating its header.
    pub fn open(path: &Path) -> Result<Self, RingError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = MmapRaw::map_raw(&file)?;
        let geometry = |detail: String| RingError::Geometry {
            path: path.to_path_buf(),
            detail,
        };

        if mmap.len() < REGION_HEADER_LEN {
            return Err(geometry(format!("region is only {} bytes", mmap.len())));
        }
        // SAFETY: length checked above
        let head = unsafe { std::slice::from_raw_parts(mmap.as_ptr(), REGION_HEADER_LEN) };
        let header: RegionHeader = bytemuck::pod_read_unaligned(head);

        if header.magic != RING_MAGIC {
            return Err(RingError::BadMagic {
                path: path.to_path_buf(),
                found: header.magic,
            });
        }
        if header.version != RING_VERSION || header.slot_size as usize != SLOT_SIZE {
            return Err(geometry(format!(
                "version {} slot size {}",
                header.version, header.slot_size
            )));
        }
        let expected = REGION_HEADER_LEN as u64 + header.slots * SLOT_SIZE as u64;
        if header.slots == 0 || (mmap.len() as u64) < expected {
            return Err(geometry(format!(
                "{} slots need {} bytes, region has {}",
                header.slots,
                expected,
                mmap.len()
            )));
        }

        info!(path = %path.display(), slots = header.slots, "Attached to ring region");
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            slots: header.slots,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn slots(&self) -> usize {
        self.slots as usize
    }

    fn atomic(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: offset is 8-aligned inside the header of a page-aligned
        // mapping that lives as long as self
        unsafe { AtomicU64::from_ptr(self.mmap.as_mut_ptr().add(offset).cast::<u64>()) }
    }

    fn slot_offset(&self, pos: u64) -> usize {
        REGION_HEADER_LEN + (pos % self.slots) as usize * SLOT_SIZE
    }

    /// Get current write position (for testing/debugging)
    pub fn write_position(&self) -> u64 {
        self.atomic(OFF_WRITE_POS).load(Ordering::Acquire)
    }

    /// Get current read position (for testing/debugging)
    pub fn read_position(&self) -> u64 {
        self.atomic(OFF_READ_POS).load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.write_position().wrapping_sub(self.read_position()) >= self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.read_position() >= self.write_position()
    }

    /// Ask the consumer to stop at its next poll.
    pub fn set_terminate(&self) {
        self.atomic(OFF_TERMINATE).store(1, Ordering::Release);
    }

    pub fn terminate_requested(&self) -> bool {
        self.atomic(OFF_TERMINATE).load(Ordering::Acquire) != 0
    }

    /// Producer: write one frame.
    /// Returns false if the ring is full (backpressure) or the frame too large.
    pub fn try_write(&self, kind: u32, data: &[u8]) -> bool {
        if data.len() > MAX_PAYLOAD {
            return false;
        }

        let write = self.write_position();
        let read = self.read_position();
        if write.wrapping_sub(read) >= self.slots {
            return false;
        }

        let offset = self.slot_offset(write);
        let header = SlotHeader {
            len: data.len() as u32,
            kind,
        };
        let header_bytes = bytemuck::bytes_of(&header);

        // SAFETY: the slot at `write` is not visible to the consumer until
        // the position is released below
        unsafe {
            let slot_ptr = self.mmap.as_mut_ptr().add(offset);
            std::ptr::copy_nonoverlapping(header_bytes.as_ptr(), slot_ptr, header_bytes.len());
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                slot_ptr.add(header_bytes.len()),
                data.len(),
            );
        }

        self.atomic(OFF_WRITE_POS).store(write + 1, Ordering::Release);
        true
    }

    /// Consumer: copy out the next frame. `Ok(None)` when the ring is empty.
    pub fn try_read(&self) -> Result<Option<RawFrame>, RingError> {
        let read = self.read_position();
        let write = self.write_position();
        if read >= write {
            return Ok(None);
        }

        let offset = self.slot_offset(read);
        let header_size = std::mem::size_of::<SlotHeader>();
        // SAFETY: the producer released this slot and will not reuse it until
        // the read position advances
        let slot = unsafe { std::slice::from_raw_parts(self.mmap.as_ptr().add(offset), SLOT_SIZE) };
        let header: SlotHeader = bytemuck::pod_read_unaligned(&slot[..header_size]);

        let len = header.len as usize;
        if len > MAX_PAYLOAD {
            return Err(RingError::CorruptSlot {
                slot: read,
                len,
                max: MAX_PAYLOAD,
            });
        }
        let data = slot[header_size..header_size + len].to_vec();

        self.atomic(OFF_READ_POS).store(read + 1, Ordering::Release);
        Ok(Some(RawFrame {
            kind: header.kind,
            data,
        }))
    }
}
