pub const PAGE_SIZE: usize = 65536;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

pub const CHUNK_SIZE: usize = 256;
pub const CHUNK_MASK: usize = CHUNK_SIZE - 1;
pub const CHUNKS_PER_PAGE: usize = PAGE_SIZE / CHUNK_SIZE;

// Chunk 0 of every page holds one kind byte per chunk of that page.
pub const PAGE_HEADER_SIZE: usize = CHUNKS_PER_PAGE;
pub const FIRST_ALLOCATABLE_CHUNK: usize = 1;

pub const GRANULE_SIZE: usize = 8;
pub const LARGE_OBJECT_THRESHOLD: usize = 256;
pub const LARGE_OBJECT_GRANULE_THRESHOLD: usize = LARGE_OBJECT_THRESHOLD / GRANULE_SIZE;

// next: u32, size: u32
pub const LARGE_OBJECT_HEADER_SIZE: usize = 8;

// wasm32 linear memory tops out at 4GiB.
pub const MAX_PAGES: usize = 65536;

const _: () = assert!(PAGE_SIZE == CHUNK_SIZE * CHUNKS_PER_PAGE);
const _: () = assert!(PAGE_HEADER_SIZE == FIRST_ALLOCATABLE_CHUNK * CHUNK_SIZE);
const _: () = assert!(LARGE_OBJECT_THRESHOLD == LARGE_OBJECT_GRANULE_THRESHOLD * GRANULE_SIZE);
const _: () = assert!(LARGE_OBJECT_HEADER_SIZE <= CHUNK_SIZE);
