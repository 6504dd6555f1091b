use crate::address::{align_up, chunk_index_of, Address};
use crate::constants::PAGE_SIZE;
use crate::error::{AllocError, Corruption};
use crate::large_object::{FreeLargeObject, LargeObject, LargeObjects};
use crate::memory::LinearMemory;
use crate::metrics::HeapStats;
use crate::page::{chunk_kind, ChunkKind};
use crate::size_class::SizeClass;
use crate::small_object::{check_slot, SmallObjects};
use log::trace;
use std::ops::Range;

/// A size-class allocator living inside a growable linear memory.
///
/// Requests of up to 256 bytes are served from per-class freelists carved
/// out of single 256 byte chunks; anything bigger gets a chunk-aligned large
/// object from a best-fit freelist. Memory is only ever obtained from the
/// host in whole pages and is never given back.
///
/// The allocator is not thread safe and not reentrant: every operation takes
/// `&mut self` and runs to completion. Sharing one across threads requires
/// an external lock.
pub struct Allocator<M: LinearMemory> {
    memory: M,
    small: SmallObjects,
    large: LargeObjects,
    allocations: usize,
    deallocations: usize,
}

impl<M: LinearMemory> Allocator<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            small: SmallObjects::new(),
            large: LargeObjects::new(),
            allocations: 0,
            deallocations: 0,
        }
    }

    /// Allocates `size` bytes, aligned to 8.
    ///
    /// A zero sized request allocates nothing and returns `Ok(None)`.
    pub fn allocate(&mut self, size: usize) -> Result<Option<Address>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        let addr = match SizeClass::for_size(size) {
            Some(class) => self.small.allocate(&mut self.memory, &mut self.large, class)?,
            None => self.large.allocate(&mut self.memory, size)?.payload(),
        };

        self.allocations += 1;
        trace!("allocated {} bytes at {}", size, addr);
        self.verify()?;

        Ok(Some(addr))
    }

    /// Returns `addr` to the freelist it was carved from.
    ///
    /// Only addresses returned by [`Allocator::allocate`] and not yet freed
    /// may be passed here. Misuse is caught where the page metadata makes it
    /// visible and reported as [`AllocError::Corrupted`]; a double free is
    /// not detected.
    pub fn deallocate(&mut self, addr: Address) -> Result<(), AllocError> {
        self.check_heap_address(addr)?;

        match chunk_kind(&self.memory, addr.get())? {
            ChunkKind::LargeObject => {
                let obj = LargeObject::from_payload(addr)?;
                self.large.release(&mut self.memory, obj)?;
            }
            ChunkKind::Small(class) => {
                check_slot(&self.memory, addr, class)?;
                self.small.release(&mut self.memory, addr, class)?;
            }
            ChunkKind::Free => {
                return Err(Corruption::UnknownChunkKind {
                    addr: addr.get(),
                    kind: ChunkKind::Free.as_u8(),
                }
                .into())
            }
        }

        self.deallocations += 1;
        trace!("freed {}", addr);
        self.verify()?;

        Ok(())
    }

    /// `malloc` over raw 32-bit offsets: `0` is null and out-of-memory also
    /// yields `0`.
    ///
    /// # Panics
    ///
    /// Panics if the heap metadata is found to be corrupted.
    pub fn malloc(&mut self, size: usize) -> u32 {
        match self.allocate(size) {
            Ok(addr) => addr.map_or(0, Address::as_u32),
            Err(AllocError::OutOfMemory { .. }) => 0,
            Err(err) => panic!("malloc({}): {}", size, err),
        }
    }

    /// `free` over raw 32-bit offsets; freeing `0` does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` was not returned by [`Allocator::malloc`] in a way the
    /// page metadata can detect.
    pub fn free(&mut self, ptr: u32) {
        let Some(addr) = Address::new(ptr as usize) else {
            return;
        };

        if let Err(err) = self.deallocate(addr) {
            panic!("free({:#x}): {}", ptr, err);
        }
    }

    /// Bytes usable at `addr`: the slot size for small objects, the recorded
    /// payload size for large ones. Always at least the requested size.
    pub fn usable_size(&self, addr: Address) -> Result<usize, AllocError> {
        self.check_heap_address(addr)?;

        match chunk_kind(&self.memory, addr.get())? {
            ChunkKind::LargeObject => Ok(LargeObject::from_payload(addr)?.size(&self.memory)?),
            ChunkKind::Small(class) => Ok(class.slot_size()),
            ChunkKind::Free => Err(Corruption::UnknownChunkKind {
                addr: addr.get(),
                kind: ChunkKind::Free.as_u8(),
            }
            .into()),
        }
    }

    /// The usable bytes of a live allocation.
    pub fn payload(&self, addr: Address) -> Result<&[u8], AllocError> {
        let range = self.payload_range(addr)?;

        Ok(&self.memory.bytes()[range])
    }

    pub fn payload_mut(&mut self, addr: Address) -> Result<&mut [u8], AllocError> {
        let range = self.payload_range(addr)?;

        Ok(&mut self.memory.bytes_mut()[range])
    }

    pub fn stats(&self) -> HeapStats {
        let heap = self.large.heap();

        HeapStats {
            granted_bytes: heap.granted(),
            memory_pages: self.memory.page_count(),
            grow_requests: heap.grow_requests(),
            refused_grow_requests: heap.refused_requests(),
            allocations: self.allocations,
            deallocations: self.deallocations,
            small_refills: self.small.refills(),
        }
    }

    /// The large-object freelist, most recently freed or split first.
    pub fn large_free_list(&self) -> Result<Vec<FreeLargeObject>, AllocError> {
        Ok(self.large.free_objects(&self.memory)?)
    }

    /// Number of free slots on the freelist of `class`.
    pub fn small_free_count(&self, class: SizeClass) -> Result<usize, AllocError> {
        Ok(self.small.free_count(&self.memory, class)?)
    }

    /// Walks every freelist and checks it against the page headers.
    pub fn check_integrity(&self) -> Result<(), AllocError> {
        self.large.check(&self.memory)?;
        self.small.check(&self.memory)?;

        Ok(())
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Tears the allocator down, handing the linear memory back.
    pub fn into_memory(self) -> M {
        self.memory
    }

    fn check_heap_address(&self, addr: Address) -> Result<(), Corruption> {
        let raw = addr.get();
        let heap_base = align_up(self.memory.heap_base(), PAGE_SIZE).unwrap_or(usize::MAX);

        if raw < heap_base {
            return Err(Corruption::BelowHeapBase { addr: raw, heap_base });
        }

        if raw >= self.memory.size() {
            return Err(Corruption::OutOfBounds {
                addr: raw,
                len: self.memory.size(),
            });
        }

        if chunk_index_of(raw) == 0 {
            return Err(Corruption::InPageHeader { addr: raw });
        }

        Ok(())
    }

    fn payload_range(&self, addr: Address) -> Result<Range<usize>, AllocError> {
        let start = addr.get();
        let end = start.saturating_add(self.usable_size(addr)?);

        if end > self.memory.size() {
            return Err(Corruption::OutOfBounds {
                addr: end,
                len: self.memory.size(),
            }
            .into());
        }

        Ok(start..end)
    }

    fn verify(&self) -> Result<(), AllocError> {
        if cfg!(feature = "extra_assertions") {
            self.check_integrity()
        } else {
            Ok(())
        }
    }
}
