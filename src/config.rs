use crate::constants::{MAX_PAGES, PAGE_SIZE};
use crate::error::ConfigError;

/// Shape of a simulated linear memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Pages present before the allocator runs. Everything above the
    /// page-aligned heap base is handed to the allocator on its first growth.
    pub initial_pages: usize,
    /// Growth requests that would exceed this many pages are refused.
    pub maximum_pages: usize,
    /// Addresses below this belong to the host (statics, stack) and are
    /// never handed out. Rounded up to a page boundary by the allocator.
    pub heap_base: usize,
}

pub const MEMORY_CONFIG_DEFAULT_INITIAL_PAGES: usize = 2;
pub const MEMORY_CONFIG_DEFAULT_MAXIMUM_PAGES: usize = 10;
pub const MEMORY_CONFIG_DEFAULT_HEAP_BASE: usize = 1024;

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maximum_pages == 0 {
            return Err(ConfigError::NoPages);
        }

        if self.maximum_pages > MAX_PAGES {
            return Err(ConfigError::TooManyPages {
                maximum: self.maximum_pages,
                limit: MAX_PAGES,
            });
        }

        if self.initial_pages > self.maximum_pages {
            return Err(ConfigError::InitialExceedsMaximum {
                initial: self.initial_pages,
                maximum: self.maximum_pages,
            });
        }

        if self.heap_base > self.initial_pages * PAGE_SIZE {
            return Err(ConfigError::HeapBaseOutsideMemory {
                heap_base: self.heap_base,
                initial: self.initial_pages,
            });
        }

        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            initial_pages: MEMORY_CONFIG_DEFAULT_INITIAL_PAGES,
            maximum_pages: MEMORY_CONFIG_DEFAULT_MAXIMUM_PAGES,
            heap_base: MEMORY_CONFIG_DEFAULT_HEAP_BASE,
        }
    }
}
