//! # Paging Structure Codec
//!
//! Bit-exact layouts of the two paging levels plus virtual-address splitting.
//!
//! - [`pd`]: page directory entries (pointer to a table, or a 4 MiB leaf).
//! - [`pt`]: page table entries (4 KiB leaves).

pub mod pd;
pub mod pt;

use crate::addresses::{MemoryAddressOffset, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use crate::info::PAGING_ENTRY_SIZE;
use crate::page_table::pd::{L2Index, PdEntry};
use crate::page_table::pt::{L1Index, PtEntry};

/// Hardware **Present** bit position shared across levels (bit 0).
const PRESENT_BIT: u32 = 1 << 0;

/// Hardware **Page Size** (PS) bit position (bit 7).
///
/// - In page directory entries: `PS=1` selects the 4 MiB leaf form.
/// - In page table entries: bit 7 is **PAT** (not PS).
const PS_BIT: u32 = 1 << 7;

/// A raw 4-byte paging entry as stored in memory.
///
/// Implemented by [`PdEntry`] and [`PtEntry`] so mapped entries can be read
/// back as their typed form.
pub trait PagingEntry: Copy {
    /// Construct from the raw stored value (no validation).
    fn from_bits(bits: u32) -> Self;

    /// The raw stored value.
    fn into_bits(self) -> u32;
}

impl PagingEntry for PdEntry {
    #[inline]
    fn from_bits(bits: u32) -> Self {
        Self::from_bits(bits)
    }

    #[inline]
    fn into_bits(self) -> u32 {
        self.into_bits()
    }
}

impl PagingEntry for PtEntry {
    #[inline]
    fn from_bits(bits: u32) -> Self {
        Self::from_bits(bits)
    }

    #[inline]
    fn into_bits(self) -> u32 {
        self.into_bits()
    }
}

/// Split a virtual address into directory index, table index and page offset.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L2Index, L1Index, MemoryAddressOffset<Size4K>) {
    (L2Index::from(va), L1Index::from(va), va.offset::<Size4K>())
}

/// Inverse of [`split_indices`].
#[inline]
#[must_use]
pub const fn join_indices(
    l2: L2Index,
    l1: L1Index,
    offset: MemoryAddressOffset<Size4K>,
) -> VirtualAddress {
    VirtualAddress::new((l2.as_u32() << 22) | (l1.as_u32() << 12) | offset.as_u32())
}

/// Physical address of directory entry `l2` in the directory at `root`.
#[inline]
#[must_use]
pub const fn pde_address(root: PhysicalPage<Size4K>, l2: L2Index) -> PhysicalAddress {
    PhysicalAddress::new(root.base().as_u32() | (l2.as_u32() * PAGING_ENTRY_SIZE))
}

/// Physical address of table entry `l1` in the page table at `table`.
#[inline]
#[must_use]
pub const fn pte_address(table: PhysicalPage<Size4K>, l1: L1Index) -> PhysicalAddress {
    PhysicalAddress::new(table.base().as_u32() | (l1.as_u32() * PAGING_ENTRY_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_ok() {
        let va = VirtualAddress::new(0xC030_1234);
        let (i2, i1, off) = split_indices(va);
        assert_eq!(i2.as_usize(), 0x300);
        assert_eq!(i1.as_usize(), 0x301);
        assert_eq!(off.as_u32(), 0x234);
    }

    #[test]
    fn split_join_identity() {
        // Sweep the whole 32-bit range with an odd stride.
        let mut v = 0u32;
        loop {
            let va = VirtualAddress::new(v);
            let (i2, i1, off) = split_indices(va);
            assert!(i2.as_usize() < 1024);
            assert!(i1.as_usize() < 1024);
            assert_eq!(join_indices(i2, i1, off), va);
            match v.checked_add(0x0001_3579) {
                Some(n) => v = n,
                None => break,
            }
        }
        let top = VirtualAddress::new(u32::MAX);
        let (i2, i1, off) = split_indices(top);
        assert_eq!(join_indices(i2, i1, off), top);
    }

    #[test]
    fn entry_addresses() {
        let root = PhysicalPage::<Size4K>::from_number(0x1234);
        assert_eq!(pde_address(root, L2Index::new(0)).as_u32(), 0x0123_4000);
        assert_eq!(pde_address(root, L2Index::new(1023)).as_u32(), 0x0123_4FFC);
        let table = PhysicalPage::<Size4K>::from_number(0x5);
        assert_eq!(pte_address(table, L1Index::new(3)).as_u32(), 0x500C);
    }
}
