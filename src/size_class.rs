use crate::constants::{
    CHUNK_SIZE, GRANULE_SIZE, LARGE_OBJECT_GRANULE_THRESHOLD, LARGE_OBJECT_THRESHOLD,
};

/// A small-object class: objects of `granules * 8` bytes, carved out of a
/// single chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(u8);

impl SizeClass {
    /// The class serving `size` bytes, or `None` for zero and for sizes that
    /// need a large object.
    pub fn for_size(size: usize) -> Option<SizeClass> {
        match size {
            1..=LARGE_OBJECT_THRESHOLD => Self::from_granules(size.div_ceil(GRANULE_SIZE)),
            _ => None,
        }
    }

    pub fn from_granules(granules: usize) -> Option<SizeClass> {
        match granules {
            1..=LARGE_OBJECT_GRANULE_THRESHOLD => Some(SizeClass(granules as u8)),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = SizeClass> {
        (1..=LARGE_OBJECT_GRANULE_THRESHOLD as u8).map(SizeClass)
    }

    pub fn granules(self) -> usize {
        self.0 as usize
    }

    pub fn slot_size(self) -> usize {
        self.granules() * GRANULE_SIZE
    }

    pub fn slots_per_chunk(self) -> usize {
        CHUNK_SIZE / self.slot_size()
    }

    pub(crate) fn index(self) -> usize {
        self.granules() - 1
    }
}
