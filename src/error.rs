use thiserror::Error;

/// Everything that can go wrong inside the allocator.
///
/// Only [`AllocError::OutOfMemory`] is recoverable. A [`Corruption`] means the
/// heap metadata no longer agrees with itself and any further use of the
/// allocator may hand out overlapping memory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of memory: host refused to grow linear memory for a {requested} byte request")]
    OutOfMemory { requested: usize },

    #[error("heap corrupted: {0}")]
    Corrupted(#[from] Corruption),
}

impl AllocError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AllocError::Corrupted(_))
    }
}

/// Invariant violations detected while reading or writing heap metadata.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    #[error("address {addr:#x} is outside linear memory ({len:#x} bytes)")]
    OutOfBounds { addr: usize, len: usize },

    #[error("address {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("address {addr:#x} is below the heap base {heap_base:#x}")]
    BelowHeapBase { addr: usize, heap_base: usize },

    #[error("address {addr:#x} lies inside a page header")]
    InPageHeader { addr: usize },

    #[error("chunk holding {addr:#x} has kind {kind}, which owns no allocation")]
    UnknownChunkKind { addr: usize, kind: u8 },

    #[error("address {addr:#x} is not on a {slot_size} byte slot boundary")]
    NotASlot { addr: usize, slot_size: usize },

    #[error("large object at {addr:#x} has inconsistent size {size}")]
    BadLargeObject { addr: usize, size: usize },

    #[error("freelist for {what} does not terminate")]
    FreelistCycle { what: &'static str },

    #[error("granted run of {pages} pages cannot hold {needed} bytes")]
    ShortGrant { pages: usize, needed: usize },

    #[error("heap base {heap_base:#x} lies beyond linear memory ({len:#x} bytes)")]
    HeapBaseBeyondMemory { heap_base: usize, len: usize },
}

/// Rejected [`crate::MemoryConfig`] values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maximum page count must be at least 1")]
    NoPages,

    #[error("initial page count {initial} exceeds maximum {maximum}")]
    InitialExceedsMaximum { initial: usize, maximum: usize },

    #[error("maximum page count {maximum} exceeds the 32-bit limit of {limit}")]
    TooManyPages { maximum: usize, limit: usize },

    #[error("heap base {heap_base:#x} does not fit in {initial} initial pages")]
    HeapBaseOutsideMemory { heap_base: usize, initial: usize },
}
