//! A small-footprint `malloc`/`free` for a single growable linear memory,
//! the kind a WebAssembly module owns.
//!
//! Memory comes from the host in 64KiB pages. Each page is split into 256
//! byte chunks, and the first chunk of every page holds one kind byte per
//! chunk. Requests of up to 256 bytes round up to one of 32 size classes of
//! 8 byte granules and are carved out of single chunks. Bigger requests get a
//! chunk-aligned large object from a best-fit freelist, split so that at most
//! one chunk is wasted.
//!
//! ```rust
//! use pagealloc::{Allocator, MemoryConfig, VecMemory};
//!
//! let memory = VecMemory::new(MemoryConfig::default()).unwrap();
//! let mut heap = Allocator::new(memory);
//!
//! let a = heap.allocate(24).unwrap().unwrap();
//! heap.payload_mut(a).unwrap()[..5].copy_from_slice(b"hello");
//! assert_eq!(&heap.payload(a).unwrap()[..5], b"hello");
//!
//! heap.deallocate(a).unwrap();
//!
//! // freed slots are reused first
//! assert_eq!(heap.allocate(20).unwrap(), Some(a));
//! ```
//!
//! When the host refuses to grow, the [`LinearMemory::out_of_memory`] hook is
//! called and the request fails with [`AllocError::OutOfMemory`]. The
//! `malloc`/`free` wrappers speak raw 32-bit offsets, with `0` as null:
//! ```rust
//! use pagealloc::{Allocator, MemoryConfig, VecMemory};
//!
//! let config = MemoryConfig {
//!     initial_pages: 1,
//!     maximum_pages: 2,
//!     heap_base: 0,
//! };
//! let mut heap = Allocator::new(VecMemory::new(config).unwrap());
//!
//! assert_eq!(heap.malloc(1 << 20), 0);
//! assert_eq!(heap.memory().out_of_memory_calls(), 1);
//!
//! let ptr = heap.malloc(100);
//! assert_ne!(ptr, 0);
//! heap.free(ptr);
//! ```
#![deny(unsafe_code)]

mod address;
mod allocator;
mod config;
mod constants;
mod error;
mod heap;
mod large_object;
mod memory;
mod metrics;
mod page;
mod size_class;
mod small_object;

pub use address::Address;
pub use allocator::Allocator;
pub use config::MemoryConfig;
pub use constants::{
    CHUNK_SIZE, GRANULE_SIZE, LARGE_OBJECT_HEADER_SIZE, LARGE_OBJECT_THRESHOLD, PAGE_SIZE,
};
pub use error::{AllocError, ConfigError, Corruption};
pub use large_object::FreeLargeObject;
pub use memory::{LinearMemory, VecMemory};
pub use metrics::HeapStats;
pub use size_class::SizeClass;

#[cfg(test)]
mod test;
