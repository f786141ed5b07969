//! # x86 Page Table (PT / L1, PAE disabled)
//!
//! This module models the lowest paging level (L1, Page Table).
//!
//! - [`L1Index`]: index type for VA bits `[21:12]`.
//! - [`Pte`]: the bit layout of a 4 KiB leaf entry.
//! - [`PtEntry`]: a PT entry (PTE). Entries represent 4 KiB leaf mappings only.
//!
//! ## Invariants & Notes
//!
//! - The base address stored in a PTE must be 4 KiB-aligned (hardware requirement).
//! - [`PtEntry::make_4k`] forces `present=1`.
//! - After modifying active mappings, the caller must perform any required TLB maintenance.

use crate::addresses::{PhysicalPage, Size4K, VirtualAddress};
use crate::info::ENTRIES_PER_TABLE;
use bitfield_struct::bitfield;

/// Index into the Page Table (derived from VA bits `[21:12]`).
///
/// Strongly typed to avoid mixing with directory indices. Range is `0..1024`
/// (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

/// **PTE**: maps one 4 KiB page.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Pte {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6).
    pub dirty: bool,
    /// PAT selector (bit 7).
    pub pat: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// Page frame number (bits 12..31).
    #[bits(20)]
    frame_31_12: u32,
}

impl Pte {
    /// Set the mapped page.
    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4K>) -> Self {
        self.set_physical_page(phys);
        self
    }

    /// Set the mapped page.
    #[inline]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4K>) {
        self.set_frame_31_12(phys.number());
    }

    /// Get the mapped page.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.frame_31_12())
    }

    /// Leaf PTE with common kernel RW flags.
    #[inline]
    #[must_use]
    pub const fn new_common_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(false)
            .with_write_through(false)
            .with_cache_disable(false)
    }
}

/// A single Page Table entry (PTE).
///
/// A present PTE maps exactly one 4 KiB page.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PtEntry(Pte);

impl L1Index {
    /// Build an index from a virtual address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    /// Return the index as `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl PtEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(Pte::new())
    }

    /// Return `true` if the entry is marked present.
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Expose the underlying bitfield for inspection/masking.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> Pte {
        self.0
    }

    /// If present, return the mapped 4 KiB physical page and its flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage<Size4K>, Pte)> {
        if !self.is_present() {
            return None;
        }
        Some((self.0.physical_page(), self.0))
    }

    /// Create a present 4 KiB leaf PTE.
    ///
    /// Sets `present=1` and writes the page base address.
    #[inline]
    #[must_use]
    pub const fn make_4k(page: PhysicalPage<Size4K>, flags: Pte) -> Self {
        Self(flags.with_present(true).with_physical_page(page))
    }

    /// Return the raw 32-bit value (flags + address).
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0.into_bits()
    }

    /// Construct from a raw 32-bit value (no validation).
    #[inline]
    #[must_use]
    pub const fn from_bits(v: u32) -> Self {
        Self(Pte::from_bits(v))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::addresses::PhysicalAddress;

    #[test]
    fn pte_4k_leaf() {
        let k4 = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x5555_0000));
        let e = PtEntry::make_4k(k4, Pte::new().with_user(true));
        let (p, fl) = e.page_4k().unwrap();
        assert_eq!(p.base().as_u32(), 0x5555_0000);
        assert!(fl.user());
        assert!(!fl.writable());
        assert_eq!(e.into_bits(), 0x5555_0005);
    }

    #[test]
    fn raw_frame_field() {
        let e = PtEntry::from_bits(0xFFFF_F063);
        let (p, fl) = e.page_4k().unwrap();
        assert_eq!(p.number(), 0xF_FFFF);
        assert!(fl.dirty());
        assert!(fl.accessed());
        assert!(!fl.pat());
        assert!(PtEntry::from_bits(0xFFFF_F000).page_4k().is_none());
    }

    #[test]
    fn index_from_va() {
        assert_eq!(L1Index::from(VirtualAddress::new(0x003F_F000)).as_usize(), 1023);
        assert_eq!(L1Index::from(VirtualAddress::new(0x0040_0FFF)).as_usize(), 0);
    }
}
