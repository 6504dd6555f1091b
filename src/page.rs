use crate::address::{chunk_index_of, page_of, ChunkAddress};
use crate::constants::LARGE_OBJECT_GRANULE_THRESHOLD;
use crate::error::Corruption;
use crate::memory::LinearMemory;
use crate::size_class::SizeClass;

const FREE_CHUNK: u8 = 0;
const LARGE_OBJECT: u8 = 255;

/// What a chunk's header byte says about its owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    Free,
    Small(SizeClass),
    LargeObject,
}

impl ChunkKind {
    pub fn as_u8(self) -> u8 {
        match self {
            ChunkKind::Free => FREE_CHUNK,
            ChunkKind::Small(class) => class.granules() as u8,
            ChunkKind::LargeObject => LARGE_OBJECT,
        }
    }
}

impl TryFrom<u8> for ChunkKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            FREE_CHUNK => Ok(ChunkKind::Free),
            LARGE_OBJECT => Ok(ChunkKind::LargeObject),
            x if (x as usize) <= LARGE_OBJECT_GRANULE_THRESHOLD => {
                SizeClass::from_granules(x as usize).map(ChunkKind::Small).ok_or(x)
            }
            x => Err(x),
        }
    }
}

/// Reads the kind of the chunk containing `addr` from its page header.
pub fn chunk_kind<M: LinearMemory>(memory: &M, addr: usize) -> Result<ChunkKind, Corruption> {
    let header = page_of(addr) + chunk_index_of(addr);
    let byte = memory.load_u8(header)?;

    ChunkKind::try_from(byte).map_err(|kind| Corruption::UnknownChunkKind { addr, kind })
}

pub fn set_chunk_kind<M: LinearMemory>(
    memory: &mut M,
    chunk: ChunkAddress,
    kind: ChunkKind,
) -> Result<(), Corruption> {
    memory.store_u8(chunk.page().get() + chunk.index(), kind.as_u8())
}
