use crate::constants::{CHUNK_SIZE, PAGE_MASK, PAGE_SIZE};
use crate::error::Corruption;
use std::fmt;
use std::num::NonZeroU32;

pub fn page_of(addr: usize) -> usize {
    addr & !PAGE_MASK
}

pub fn chunk_index_of(addr: usize) -> usize {
    (addr & PAGE_MASK) / CHUNK_SIZE
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two. `None` on overflow.
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());

    value
        .checked_add(alignment - 1)
        .map(|bumped| bumped & !(alignment - 1))
}

pub fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());

    value & (alignment - 1) == 0
}

/// A non-null offset into linear memory, as handed out by the allocator.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroU32);

impl Address {
    /// `None` for the null offset and for anything past the 32-bit range.
    pub fn new(raw: usize) -> Option<Address> {
        u32::try_from(raw).ok().and_then(NonZeroU32::new).map(Address)
    }

    pub fn get(self) -> usize {
        self.0.get() as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }

    pub fn page(self) -> PageAddress {
        PageAddress(page_of(self.get()))
    }

    pub fn chunk_index(self) -> usize {
        chunk_index_of(self.get())
    }

    /// `bytes` below this address; fails if that would reach null.
    pub fn checked_sub(self, bytes: usize) -> Result<Address, Corruption> {
        self.get()
            .checked_sub(bytes)
            .and_then(Address::new)
            .ok_or(Corruption::OutOfBounds {
                addr: self.get().wrapping_sub(bytes),
                len: u32::MAX as usize,
            })
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.get())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

/// Start of a 64KiB page. The kind bytes for its chunks live here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageAddress(usize);

impl PageAddress {
    pub fn new(raw: usize) -> Result<PageAddress, Corruption> {
        if !is_aligned(raw, PAGE_SIZE) {
            return Err(Corruption::Misaligned {
                addr: raw,
                align: PAGE_SIZE,
            });
        }

        Ok(PageAddress(raw))
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn chunk(self, index: usize) -> Result<ChunkAddress, Corruption> {
        debug_assert!(index < PAGE_SIZE / CHUNK_SIZE);

        ChunkAddress::new(self.0 + index * CHUNK_SIZE)
    }
}

/// Start of a 256 byte chunk. Never chunk 0 of a page, which is the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkAddress(Address);

impl ChunkAddress {
    pub fn new(raw: usize) -> Result<ChunkAddress, Corruption> {
        let addr = Address::new(raw).ok_or(Corruption::OutOfBounds {
            addr: raw,
            len: u32::MAX as usize,
        })?;

        if !is_aligned(raw, CHUNK_SIZE) {
            return Err(Corruption::Misaligned {
                addr: raw,
                align: CHUNK_SIZE,
            });
        }

        if chunk_index_of(raw) == 0 {
            return Err(Corruption::InPageHeader { addr: raw });
        }

        Ok(ChunkAddress(addr))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    pub fn page(self) -> PageAddress {
        self.0.page()
    }

    pub fn index(self) -> usize {
        self.0.chunk_index()
    }

    pub fn end(self) -> usize {
        self.get() + CHUNK_SIZE
    }

    pub fn address(self) -> Address {
        self.0
    }

    /// An address inside this chunk.
    pub fn offset(self, bytes: usize) -> Address {
        debug_assert!(bytes < CHUNK_SIZE);

        // chunks start at most 256 bytes below 4GiB
        Address(self.0 .0.saturating_add(bytes as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_chunk_of_address() {
        assert_eq!(page_of(0x1_0123), 0x1_0000);
        assert_eq!(chunk_index_of(0x1_0123), 1);
        assert_eq!(chunk_index_of(0x1_00ff), 0);
        assert_eq!(chunk_index_of(0x1_ffff), 255);
        assert_eq!(page_of(0x2_0000), 0x2_0000);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, CHUNK_SIZE), Some(0));
        assert_eq!(align_up(1, CHUNK_SIZE), Some(256));
        assert_eq!(align_up(256, CHUNK_SIZE), Some(256));
        assert_eq!(align_up(65537, PAGE_SIZE), Some(2 * PAGE_SIZE));
        assert_eq!(align_up(usize::MAX, PAGE_SIZE), None);
    }

    #[test]
    fn null_is_not_an_address() {
        assert!(Address::new(0).is_none());
        assert!(Address::new(u32::MAX as usize + 1).is_none());
        assert_eq!(Address::new(0x100).map(Address::get), Some(0x100));
    }

    #[test]
    fn aligned_constructors_reject_misalignment() {
        assert!(PageAddress::new(PAGE_SIZE).is_ok());
        assert_eq!(
            PageAddress::new(PAGE_SIZE + CHUNK_SIZE),
            Err(Corruption::Misaligned {
                addr: PAGE_SIZE + CHUNK_SIZE,
                align: PAGE_SIZE
            })
        );

        assert!(ChunkAddress::new(PAGE_SIZE + CHUNK_SIZE).is_ok());
        assert!(matches!(
            ChunkAddress::new(PAGE_SIZE + 8),
            Err(Corruption::Misaligned { .. })
        ));
        assert_eq!(
            ChunkAddress::new(PAGE_SIZE),
            Err(Corruption::InPageHeader { addr: PAGE_SIZE })
        );
    }

    #[test]
    fn chunk_round_trips_through_page() {
        let chunk = ChunkAddress::new(3 * PAGE_SIZE + 7 * CHUNK_SIZE).unwrap();

        assert_eq!(chunk.index(), 7);
        assert_eq!(chunk.page().get(), 3 * PAGE_SIZE);
        assert_eq!(chunk.page().chunk(7), Ok(chunk));
        assert!(chunk.page().chunk(0).is_err());
        assert_eq!(chunk.address().get(), chunk.get());
        assert_eq!(chunk.offset(8).get(), chunk.get() + 8);
    }

    #[test]
    fn address_arithmetic_is_checked() {
        let addr = Address::new(16).unwrap();

        assert_eq!(addr.checked_sub(8).map(Address::get), Ok(8));
        assert!(addr.checked_sub(16).is_err());
        assert!(addr.checked_sub(17).is_err());
    }
}
