use crate::address::{align_up, PageAddress};
use crate::constants::{PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::error::{AllocError, Corruption};
use crate::memory::LinearMemory;
use log::{debug, warn};

/// A contiguous run of pages that was just handed to the allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageRun {
    pub base: PageAddress,
    pub pages: usize,
}

impl PageRun {
    pub fn size(&self) -> usize {
        self.pages * PAGE_SIZE
    }
}

/// Tracks how much linear memory belongs to the allocator and decides how
/// much more to ask the host for.
pub struct HeapGrowth {
    // None until the preallocated pages above the heap base are claimed
    granted: Option<usize>,
    grow_requests: usize,
    refused_requests: usize,
}

impl HeapGrowth {
    pub fn new() -> Self {
        Self {
            granted: None,
            grow_requests: 0,
            refused_requests: 0,
        }
    }

    pub fn granted(&self) -> usize {
        self.granted.unwrap_or(0)
    }

    pub fn grow_requests(&self) -> usize {
        self.grow_requests
    }

    pub fn refused_requests(&self) -> usize {
        self.refused_requests
    }

    /// Finds room for `payload_size` bytes plus a page header.
    ///
    /// The first call claims whatever memory the host already has above the
    /// heap base. When that isn't enough, the heap grows by at least half of
    /// what has been granted so far, so the number of host requests stays
    /// logarithmic in the final heap size.
    pub fn allocate_pages<M: LinearMemory>(
        &mut self,
        memory: &mut M,
        payload_size: usize,
    ) -> Result<PageRun, AllocError> {
        let heap_size = memory.size();
        let (mut base, preallocated, granted) = match self.granted {
            Some(granted) => (heap_size, 0, granted),
            None => {
                let heap_base = align_up(memory.heap_base(), PAGE_SIZE).ok_or(
                    Corruption::HeapBaseBeyondMemory {
                        heap_base: memory.heap_base(),
                        len: heap_size,
                    },
                )?;

                if heap_base > heap_size {
                    return Err(Corruption::HeapBaseBeyondMemory {
                        heap_base,
                        len: heap_size,
                    }
                    .into());
                }

                let preallocated = heap_size - heap_base;
                (heap_base, preallocated, preallocated)
            }
        };

        let mut grow = 0;
        let needed = payload_size.checked_add(PAGE_HEADER_SIZE);

        if needed.map_or(true, |needed| preallocated < needed) {
            grow = match needed
                .map(|needed| (granted / 2).max(needed - preallocated))
                .and_then(|shortfall| align_up(shortfall, PAGE_SIZE))
            {
                Some(grow) => grow,
                None => return Err(self.refuse(memory, payload_size)),
            };
            debug_assert!(grow != 0);

            match memory.grow(grow / PAGE_SIZE) {
                Some(previous_pages) => {
                    if preallocated == 0 {
                        base = previous_pages * PAGE_SIZE;
                    }
                }
                None => return Err(self.refuse(memory, payload_size)),
            }

            self.grow_requests += 1;
            debug!(
                "grew linear memory by {} pages for a {} byte request ({} bytes granted)",
                grow / PAGE_SIZE,
                payload_size,
                granted + grow
            );
        }

        let size = preallocated + grow;
        if size == 0 {
            return Err(Corruption::ShortGrant {
                pages: 0,
                needed: payload_size,
            }
            .into());
        }

        self.granted = Some(granted + grow);

        Ok(PageRun {
            base: PageAddress::new(base)?,
            pages: size / PAGE_SIZE,
        })
    }

    fn refuse<M: LinearMemory>(&mut self, memory: &mut M, requested: usize) -> AllocError {
        self.refused_requests += 1;
        warn!(
            "host refused growth for a {} byte request ({} bytes granted)",
            requested,
            self.granted()
        );
        memory.out_of_memory();

        AllocError::OutOfMemory { requested }
    }
}

impl Default for HeapGrowth {
    fn default() -> Self {
        Self::new()
    }
}
