/// A snapshot of the allocator's counters.
///
/// Obtained by calling [`crate::Allocator::stats`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes of linear memory owned by the allocator, including the pages
    /// that already existed above the heap base when it started.
    pub granted_bytes: usize,

    /// Current size of the whole linear memory in pages.
    pub memory_pages: usize,

    /// Number of times the host was asked for more pages and agreed.
    pub grow_requests: usize,

    /// Number of times the host refused to grow. Each of these surfaced as
    /// an out-of-memory error.
    pub refused_grow_requests: usize,

    pub allocations: usize,
    pub deallocations: usize,

    /// Chunks carved into small-object slots.
    pub small_refills: usize,
}

impl HeapStats {
    pub fn live_allocations(&self) -> usize {
        self.allocations.saturating_sub(self.deallocations)
    }
}
