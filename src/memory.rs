use crate::config::MemoryConfig;
use crate::constants::PAGE_SIZE;
use crate::error::{ConfigError, Corruption};
use log::{debug, warn};

/// The host side of the allocator: a linear memory that only grows, in
/// whole pages, plus a hook to report refused growth.
///
/// The allocator keeps its freelist links and headers inside this memory,
/// so every access goes through the bounds-checked loads and stores below.
/// Multi-byte values are little-endian.
pub trait LinearMemory {
    fn page_count(&self) -> usize;

    /// Grows by `pages` whole pages, returning the page count before the
    /// growth, or `None` when the host has no backing storage left.
    fn grow(&mut self, pages: usize) -> Option<usize>;

    /// Lowest address the allocator may hand out.
    fn heap_base(&self) -> usize;

    /// Called once for every refused growth request, before the failure is
    /// returned to the caller of `allocate`.
    fn out_of_memory(&mut self) {}

    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    fn size(&self) -> usize {
        self.page_count() * PAGE_SIZE
    }

    fn load_u8(&self, addr: usize) -> Result<u8, Corruption> {
        let bytes = self.bytes();

        bytes.get(addr).copied().ok_or(Corruption::OutOfBounds {
            addr,
            len: bytes.len(),
        })
    }

    fn store_u8(&mut self, addr: usize, value: u8) -> Result<(), Corruption> {
        let bytes = self.bytes_mut();
        let len = bytes.len();
        let slot = bytes
            .get_mut(addr)
            .ok_or(Corruption::OutOfBounds { addr, len })?;

        *slot = value;
        Ok(())
    }

    fn load_u32(&self, addr: usize) -> Result<u32, Corruption> {
        let bytes = self.bytes();
        let word = addr
            .checked_add(4)
            .and_then(|end| bytes.get(addr..end))
            .ok_or(Corruption::OutOfBounds {
                addr,
                len: bytes.len(),
            })?;

        let mut raw = [0; 4];
        raw.copy_from_slice(word);
        Ok(u32::from_le_bytes(raw))
    }

    fn store_u32(&mut self, addr: usize, value: u32) -> Result<(), Corruption> {
        let bytes = self.bytes_mut();
        let len = bytes.len();
        let word = addr
            .checked_add(4)
            .and_then(|end| bytes.get_mut(addr..end))
            .ok_or(Corruption::OutOfBounds { addr, len })?;

        word.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

/// A linear memory simulated on the Rust heap, bounded by
/// [`MemoryConfig::maximum_pages`].
pub struct VecMemory {
    data: Vec<u8>,
    maximum_pages: usize,
    heap_base: usize,
    grow_calls: usize,
    out_of_memory_calls: usize,
}

impl VecMemory {
    pub fn new(config: MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            data: vec![0; config.initial_pages * PAGE_SIZE],
            maximum_pages: config.maximum_pages,
            heap_base: config.heap_base,
            grow_calls: 0,
            out_of_memory_calls: 0,
        })
    }

    pub fn maximum_pages(&self) -> usize {
        self.maximum_pages
    }

    /// Number of successful `grow` calls.
    pub fn grow_calls(&self) -> usize {
        self.grow_calls
    }

    pub fn out_of_memory_calls(&self) -> usize {
        self.out_of_memory_calls
    }
}

impl LinearMemory for VecMemory {
    fn page_count(&self) -> usize {
        self.data.len() / PAGE_SIZE
    }

    fn grow(&mut self, pages: usize) -> Option<usize> {
        let previous = self.page_count();
        let wanted = previous.checked_add(pages)?;

        if wanted > self.maximum_pages {
            debug!(
                "refusing to grow from {} to {} pages (maximum {})",
                previous, wanted, self.maximum_pages
            );
            return None;
        }

        self.data.resize(wanted * PAGE_SIZE, 0);
        self.grow_calls += 1;

        Some(previous)
    }

    fn heap_base(&self) -> usize {
        self.heap_base
    }

    fn out_of_memory(&mut self) {
        self.out_of_memory_calls += 1;
        warn!(
            "linear memory exhausted at {} of {} pages",
            self.page_count(),
            self.maximum_pages
        );
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
