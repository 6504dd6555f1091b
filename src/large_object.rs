use crate::address::{align_up, chunk_index_of, is_aligned, page_of, Address, ChunkAddress};
use crate::constants::{
    CHUNK_MASK, CHUNK_SIZE, FIRST_ALLOCATABLE_CHUNK, LARGE_OBJECT_HEADER_SIZE, PAGE_HEADER_SIZE,
    PAGE_MASK, PAGE_SIZE,
};
use crate::error::{AllocError, Corruption};
use crate::heap::HeapGrowth;
use crate::memory::LinearMemory;
use crate::page::{chunk_kind, set_chunk_kind, ChunkKind};
use log::{debug, trace};

const NEXT_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;

/// A chunk-aligned region that starts with a `{next, size}` header.
///
/// The header stays in place while the object is handed out, so freeing it
/// only needs the payload address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LargeObject {
    header: ChunkAddress,
}

impl LargeObject {
    pub fn at(header: ChunkAddress) -> Self {
        Self { header }
    }

    pub fn from_payload(payload: Address) -> Result<Self, Corruption> {
        let header = payload.checked_sub(LARGE_OBJECT_HEADER_SIZE)?;

        Ok(Self::at(ChunkAddress::new(header.get())?))
    }

    pub fn chunk(self) -> ChunkAddress {
        self.header
    }

    pub fn payload(self) -> Address {
        self.header.offset(LARGE_OBJECT_HEADER_SIZE)
    }

    /// Payload bytes, excluding the header.
    pub fn size<M: LinearMemory>(self, memory: &M) -> Result<usize, Corruption> {
        Ok(memory.load_u32(self.header.get() + SIZE_OFFSET)? as usize)
    }

    fn set_size<M: LinearMemory>(self, memory: &mut M, size: usize) -> Result<(), Corruption> {
        let raw = u32::try_from(size).map_err(|_| Corruption::BadLargeObject {
            addr: self.header.get(),
            size,
        })?;

        memory.store_u32(self.header.get() + SIZE_OFFSET, raw)
    }

    fn next<M: LinearMemory>(self, memory: &M) -> Result<Option<LargeObject>, Corruption> {
        match memory.load_u32(self.header.get() + NEXT_OFFSET)? {
            0 => Ok(None),
            raw => Ok(Some(LargeObject::at(ChunkAddress::new(raw as usize)?))),
        }
    }

    fn set_next<M: LinearMemory>(
        self,
        memory: &mut M,
        next: Option<LargeObject>,
    ) -> Result<(), Corruption> {
        let raw = next.map_or(0, |obj| obj.header.address().as_u32());

        memory.store_u32(self.header.get() + NEXT_OFFSET, raw)
    }
}

/// A free large object as seen from outside the allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FreeLargeObject {
    pub payload: Address,
    pub size: usize,
}

/// Best-fit freelist of large objects, fed with fresh pages by the
/// [`HeapGrowth`] it owns.
///
/// Neighbouring free objects are never merged; each one stays its own
/// freelist entry until it is handed out or split again.
pub struct LargeObjects {
    head: Option<LargeObject>,
    heap: HeapGrowth,
}

impl LargeObjects {
    pub fn new() -> Self {
        Self {
            head: None,
            heap: HeapGrowth::new(),
        }
    }

    pub fn heap(&self) -> &HeapGrowth {
        &self.heap
    }

    /// Hands out a large object with at least `size` payload bytes.
    ///
    /// The result is chunk-aligned and its chunk is marked as starting a
    /// large object. If more than a chunk is left over behind the request,
    /// the tail is split off and returned to the freelist.
    pub fn allocate<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        size: usize,
    ) -> Result<LargeObject, AllocError> {
        let (obj, obj_size) = match self.find_and_unlink(memory, size)? {
            Some(found) => found,
            None => self.carve_pages(memory, size)?,
        };

        self.split(memory, obj, obj_size, size)?;

        Ok(obj)
    }

    pub fn release<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        obj: LargeObject,
    ) -> Result<(), Corruption> {
        trace!("releasing large object at {:#x}", obj.header.get());
        obj.set_next(memory, self.head)?;
        self.head = Some(obj);

        Ok(())
    }

    /// Unlinks the smallest free object with room for `size` payload bytes.
    pub fn find_and_unlink<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        size: usize,
    ) -> Result<Option<(LargeObject, usize)>, Corruption> {
        // an object this big leaves nothing to split, so nothing fits better
        let exact_fit = size
            .checked_add(LARGE_OBJECT_HEADER_SIZE)
            .and_then(|total| align_up(total, CHUNK_SIZE));
        let mut budget = walk_budget(memory);
        let mut best: Option<(Option<LargeObject>, LargeObject, usize)> = None;
        let mut prev = None;
        let mut walk = self.head;

        while let Some(obj) = walk {
            budget = budget.checked_sub(1).ok_or(Corruption::FreelistCycle {
                what: "large objects",
            })?;

            let obj_size = obj.size(memory)?;
            if obj_size >= size && best.map_or(true, |(_, _, best_size)| obj_size < best_size) {
                best = Some((prev, obj, obj_size));

                if exact_fit == Some(obj_size + LARGE_OBJECT_HEADER_SIZE) {
                    break;
                }
            }

            prev = Some(obj);
            walk = obj.next(memory)?;
        }

        let Some((prev, obj, obj_size)) = best else {
            return Ok(None);
        };

        let next = obj.next(memory)?;
        match prev {
            Some(prev) => prev.set_next(memory, next)?,
            None => self.head = next,
        }

        trace!(
            "best fit for {} bytes is {} bytes at {:#x}",
            size,
            obj_size,
            obj.header.get()
        );

        Ok(Some((obj, obj_size)))
    }

    // Turns a fresh run of pages into one large object starting right after
    // the first page header.
    fn carve_pages<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        size: usize,
    ) -> Result<(LargeObject, usize), AllocError> {
        let size_with_header = size.saturating_add(LARGE_OBJECT_HEADER_SIZE);
        let run = self.heap.allocate_pages(memory, size_with_header)?;
        let chunk = run.base.chunk(FIRST_ALLOCATABLE_CHUNK)?;
        let obj = LargeObject::at(chunk);
        let obj_size = run.size() - PAGE_HEADER_SIZE - LARGE_OBJECT_HEADER_SIZE;

        if obj_size < size {
            return Err(Corruption::ShortGrant {
                pages: run.pages,
                needed: size_with_header,
            }
            .into());
        }

        set_chunk_kind(memory, chunk, ChunkKind::LargeObject)?;
        obj.set_next(memory, None)?;
        obj.set_size(memory, obj_size)?;

        debug!(
            "carved {} pages at {:#x} into a {} byte large object",
            run.pages,
            run.base.get(),
            obj_size
        );

        Ok((obj, obj_size))
    }

    fn split<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        obj: LargeObject,
        obj_size: usize,
        size: usize,
    ) -> Result<(), Corruption> {
        let bad_object = Corruption::BadLargeObject {
            addr: obj.header.get(),
            size: obj_size,
        };

        let mut tail_size = (obj_size - size) & !CHUNK_MASK;
        if tail_size == 0 {
            return Ok(());
        }

        let start = obj.payload().get();
        let end = start + obj_size;

        if page_of(start) == page_of(end - 1) {
            if !is_aligned(end, CHUNK_SIZE) {
                return Err(bad_object);
            }
        } else {
            // An object spanning pages keeps whole tail pages, so a split
            // crossing a page boundary can only happen on a page boundary.
            if !is_aligned(end, PAGE_SIZE) {
                return Err(bad_object);
            }

            let first_page_size = PAGE_SIZE - (start & PAGE_MASK);
            let tail_pages_size =
                align_up(size.saturating_sub(first_page_size), PAGE_SIZE).ok_or(bad_object)?;

            tail_size = obj_size
                .checked_sub(first_page_size + tail_pages_size)
                .ok_or(bad_object)?;
        }

        obj.set_size(memory, obj_size - tail_size)?;

        let mut tail_start = end - tail_size;
        while tail_size != 0 && chunk_index_of(tail_start) < FIRST_ALLOCATABLE_CHUNK {
            // never start an object inside a page header
            tail_size -= CHUNK_SIZE;
            tail_start += CHUNK_SIZE;
        }

        if tail_size == 0 {
            return Ok(());
        }

        let chunk = ChunkAddress::new(tail_start)?;
        let tail = LargeObject::at(chunk);

        set_chunk_kind(memory, chunk, ChunkKind::LargeObject)?;
        tail.set_next(memory, self.head)?;
        tail.set_size(memory, tail_size - LARGE_OBJECT_HEADER_SIZE)?;
        self.head = Some(tail);

        debug!(
            "split {} byte tail at {:#x} off large object at {:#x}",
            tail_size,
            tail_start,
            obj.header.get()
        );

        Ok(())
    }

    pub fn free_objects<M: LinearMemory>(
        &self,
        memory: &M,
    ) -> Result<Vec<FreeLargeObject>, Corruption> {
        let mut objects = vec![];
        self.walk(memory, |obj, size| {
            objects.push(FreeLargeObject {
                payload: obj.payload(),
                size,
            });
            Ok(())
        })?;

        Ok(objects)
    }

    /// Checks that every free object is marked in its page header and ends
    /// on a chunk boundary inside linear memory.
    pub fn check<M: LinearMemory>(&self, memory: &M) -> Result<(), Corruption> {
        self.walk(memory, |obj, size| {
            let addr = obj.header.get();
            let bad_object = Corruption::BadLargeObject { addr, size };

            if chunk_kind(memory, addr)? != ChunkKind::LargeObject {
                return Err(bad_object);
            }

            let end = obj.payload().get() + size;
            if !is_aligned(end, CHUNK_SIZE) || end > memory.size() {
                return Err(bad_object);
            }

            Ok(())
        })
    }

    fn walk<M, F>(&self, memory: &M, mut visit: F) -> Result<(), Corruption>
    where
        M: LinearMemory,
        F: FnMut(LargeObject, usize) -> Result<(), Corruption>,
    {
        let mut budget = walk_budget(memory);
        let mut walk = self.head;

        while let Some(obj) = walk {
            budget = budget.checked_sub(1).ok_or(Corruption::FreelistCycle {
                what: "large objects",
            })?;

            visit(obj, obj.size(memory)?)?;
            walk = obj.next(memory)?;
        }

        Ok(())
    }
}

impl Default for LargeObjects {
    fn default() -> Self {
        Self::new()
    }
}

// No list can hold more entries than there are chunks in memory.
fn walk_budget<M: LinearMemory>(memory: &M) -> usize {
    memory.size() / CHUNK_SIZE + 1
}
