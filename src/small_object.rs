use crate::address::{chunk_index_of, page_of, Address};
use crate::constants::{CHUNK_SIZE, LARGE_OBJECT_GRANULE_THRESHOLD};
use crate::error::{AllocError, Corruption};
use crate::large_object::LargeObjects;
use crate::memory::LinearMemory;
use crate::page::{chunk_kind, set_chunk_kind, ChunkKind};
use crate::size_class::SizeClass;
use log::{debug, trace};

/// One LIFO freelist per size class. The link to the next free slot is
/// stored in the first four bytes of the slot itself.
pub struct SmallObjects {
    freelists: [Option<Address>; LARGE_OBJECT_GRANULE_THRESHOLD],
    refills: usize,
}

impl SmallObjects {
    pub fn new() -> Self {
        Self {
            freelists: [None; LARGE_OBJECT_GRANULE_THRESHOLD],
            refills: 0,
        }
    }

    pub fn refills(&self) -> usize {
        self.refills
    }

    pub fn allocate<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        large: &mut LargeObjects,
        class: SizeClass,
    ) -> Result<Address, AllocError> {
        let head = match self.freelists[class.index()] {
            Some(head) => head,
            None => self.refill(memory, large, class)?,
        };

        self.freelists[class.index()] = load_link(memory, head)?;
        trace!("small alloc of {} bytes at {}", class.slot_size(), head);

        Ok(head)
    }

    pub fn release<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        addr: Address,
        class: SizeClass,
    ) -> Result<(), Corruption> {
        store_link(memory, addr, self.freelists[class.index()])?;
        self.freelists[class.index()] = Some(addr);

        Ok(())
    }

    /// Carves a single chunk into slots of `class`, filling from the end of
    /// the chunk, and makes them the class's freelist.
    pub fn refill<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        large: &mut LargeObjects,
        class: SizeClass,
    ) -> Result<Address, AllocError> {
        // a zero byte large object is exactly one chunk
        let chunk = large.allocate(memory, 0)?.chunk();
        set_chunk_kind(memory, chunk, ChunkKind::Small(class))?;

        let slot_size = class.slot_size();
        let end = chunk.end();
        let mut head = None;
        let mut offset = slot_size;

        while offset <= CHUNK_SIZE {
            let slot = chunk.offset(CHUNK_SIZE - offset);
            store_link(memory, slot, head)?;
            head = Some(slot);
            offset += slot_size;
        }

        self.refills += 1;
        self.freelists[class.index()] = head;
        debug!(
            "refilled {} byte class with {} slots at {:#x}",
            slot_size,
            class.slots_per_chunk(),
            end - CHUNK_SIZE
        );

        head.ok_or(
            Corruption::ShortGrant {
                pages: 0,
                needed: slot_size,
            }
            .into(),
        )
    }

    pub fn free_count<M: LinearMemory>(
        &self,
        memory: &M,
        class: SizeClass,
    ) -> Result<usize, Corruption> {
        let mut count = 0;
        self.walk(memory, class, |_| {
            count += 1;
            Ok(())
        })?;

        Ok(count)
    }

    /// Checks that every free slot sits on a slot boundary of a chunk that is
    /// marked with its class.
    pub fn check<M: LinearMemory>(&self, memory: &M) -> Result<(), Corruption> {
        for class in SizeClass::all() {
            self.walk(memory, class, |slot| check_slot(memory, slot, class))?;
        }

        Ok(())
    }

    fn walk<M, F>(&self, memory: &M, class: SizeClass, mut visit: F) -> Result<(), Corruption>
    where
        M: LinearMemory,
        F: FnMut(Address) -> Result<(), Corruption>,
    {
        let mut budget = memory.size() / class.slot_size() + 1;
        let mut walk = self.freelists[class.index()];

        while let Some(slot) = walk {
            budget = budget.checked_sub(1).ok_or(Corruption::FreelistCycle {
                what: "small objects",
            })?;

            visit(slot)?;
            walk = load_link(memory, slot)?;
        }

        Ok(())
    }
}

impl Default for SmallObjects {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails unless `addr` is the start of a slot in a chunk of `class`.
pub fn check_slot<M: LinearMemory>(
    memory: &M,
    addr: Address,
    class: SizeClass,
) -> Result<(), Corruption> {
    let raw = addr.get();

    if chunk_index_of(raw) == 0 {
        return Err(Corruption::InPageHeader { addr: raw });
    }

    if chunk_kind(memory, raw)? != ChunkKind::Small(class) {
        return Err(Corruption::UnknownChunkKind {
            addr: raw,
            kind: memory.load_u8(page_of(raw) + chunk_index_of(raw))?,
        });
    }

    let chunk_end = page_of(raw) + (chunk_index_of(raw) + 1) * CHUNK_SIZE;
    if (chunk_end - raw) % class.slot_size() != 0 {
        return Err(Corruption::NotASlot {
            addr: raw,
            slot_size: class.slot_size(),
        });
    }

    Ok(())
}

fn load_link<M: LinearMemory>(memory: &M, slot: Address) -> Result<Option<Address>, Corruption> {
    Ok(Address::new(memory.load_u32(slot.get())? as usize))
}

fn store_link<M: LinearMemory>(
    memory: &mut M,
    slot: Address,
    next: Option<Address>,
) -> Result<(), Corruption> {
    memory.store_u32(slot.get(), next.map_or(0, Address::as_u32))
}
