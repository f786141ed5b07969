//! # x86 Page Directory (PD / L2, PAE disabled)
//!
//! This module models the top paging level of 32-bit paging:
//!
//! - [`L2Index`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a PD entry that is either a pointer to a PT (`PS=0`) or a 4 MiB leaf (`PS=1`).
//! - [`PdEntryKind`]: decoded view of an entry (next PT vs 4 MiB leaf).
//!
//! ## Semantics
//!
//! The `PS` bit selects the role of an entry:
//! - `PS=0`: entry points to a Page Table (PT), whose base is 4 KiB-aligned.
//! - `PS=1`: entry is a 4 MiB leaf mapping; base must be 4 MiB-aligned.
//!
//! ## Invariants & Notes
//!
//! - [`PdEntry::present_table`] forces `PS=0`; [`PdEntry::present_large`] forces `PS=1`.
//! - Raw constructors don’t validate consistency; callers must ensure correctness.
//! - TLB maintenance is the caller’s responsibility after mutating active mappings.

use crate::addresses::{PhysicalPage, Size4K, Size4M, VirtualAddress};
use crate::info::ENTRIES_PER_TABLE;
use crate::page_table::{PRESENT_BIT, PS_BIT};
use bitfield_struct::bitfield;
use core::fmt;

/// **Borrowed view** into a PDE.
///
/// Returned by [`PdEntry::view`].
pub enum L2View {
    /// Non-leaf PDE view (PS=0).
    Entry(Pde),
    /// 4 MiB leaf PDE view (PS=1).
    Leaf4M(Pde4M),
}

/// **PDE union**: overlays non-leaf [`Pde`] and leaf [`Pde4M`]
/// on the same 32-bit storage.
///
/// Prefer [`PdEntry::view`] or [`PdEntry::kind`] for typed access.
#[derive(Copy, Clone)]
#[repr(C)]
pub union PdEntry {
    /// Raw 32-bit storage of the entry.
    bits: u32,
    /// Non-leaf form: Page Table pointer (PS=0).
    entry: Pde,
    /// Leaf form: 4 MiB mapping (PS=1).
    leaf_4m: Pde4M,
}

/// **PDE**: pointer to a **Page Table** (non-leaf; PS **= 0**).
///
/// Bits **31:12** hold the 4 KiB-aligned physical base of the page table.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Pde {
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
    /// Bit 6: **ignored** in non-leaf.
    #[bits(1)]
    __ignored6: u8,
    /// PS (bit 7): **must be 0** in non-leaf.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// Global (bit 8): **ignored** in non-leaf.
    #[bits(1)]
    __g_ignored: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// **Page table physical address** (bits 12..31, 4 KiB-aligned).
    #[bits(20)]
    table_31_12: u32,
}

impl Pde {
    /// Set the Page Table base (4 KiB-aligned).
    #[inline]
    #[must_use]
    pub const fn with_page_table(mut self, table: PhysicalPage<Size4K>) -> Self {
        self.set_page_table(table);
        self
    }

    /// Set the Page Table base (4 KiB-aligned).
    #[inline]
    pub const fn set_page_table(&mut self, table: PhysicalPage<Size4K>) {
        self.set_table_31_12(table.number());
    }

    /// Get the Page Table base.
    #[inline]
    #[must_use]
    pub const fn page_table(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.table_31_12())
    }

    /// Non-leaf PDE with common kernel RW flags.
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

/// **PDE (4 MiB leaf)**: maps a single 4 MiB page (`PS = 1`).
///
/// - **PAT** selector lives at bit **12** in this form.
/// - Physical address uses bits **31:22** and must be **4 MiB aligned**.
///
/// This is a terminal mapping (leaf).
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Pde4M {
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
    /// **Dirty** (bit 6): set by CPU on first write to this 4 MiB page.
    pub dirty: bool,
    /// **Page Size** (bit 7): **must be 1** for a 4 MiB leaf.
    #[bits(default = true)]
    pub(crate) page_size: bool,
    /// **Global** (bit 8): TLB entry not flushed on CR3 reload.
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// **PAT** selector for 4 MiB mappings (bit 12).
    pub pat_large: bool,
    /// Reserved (bits 13..21): must be 0.
    #[bits(9)]
    __res13_21: u16,
    /// Physical address bits **31:22** (4 MiB-aligned base).
    #[bits(10)]
    frame_31_22: u16,
}

impl Pde4M {
    /// Set the 4 MiB page base.
    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4M>) -> Self {
        self.set_physical_page(phys);
        self
    }

    /// Set the 4 MiB page base.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4M>) {
        self.set_frame_31_22(phys.number() as u16);
        self.set_page_size(true);
    }

    /// Get the 4 MiB page base.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4M> {
        PhysicalPage::from_number(self.frame_31_22() as u32)
    }

    /// Leaf PDE with common kernel RW flags.
    #[inline]
    #[must_use]
    pub const fn new_common_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(false)
            .with_write_through(false)
            .with_cache_disable(false)
            .with_page_size(true)
    }
}

/// Index into the Page Directory (derived from VA bits `[31:22]`).
///
/// Strongly-typed to avoid mixing with table indices. Range is `0..1024`
/// (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u16);

/// Decoded PDE kind.
///
/// - [`NextPageTable`](PdEntryKind::NextPageTable): non-leaf (`PS=0`), contains the 4 KiB-aligned PT base.
/// - [`Leaf4MiB`](PdEntryKind::Leaf4MiB): leaf (`PS=1`), contains the 4 MiB-aligned large-page base.
#[derive(Debug)]
pub enum PdEntryKind {
    NextPageTable(PhysicalPage<Size4K>, Pde),
    Leaf4MiB(PhysicalPage<Size4M>, Pde4M),
}

impl L2Index {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
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

impl Default for PdEntry {
    #[inline]
    fn default() -> Self {
        Self::zero()
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    #[must_use]
    pub const fn new_entry(entry: Pde) -> Self {
        Self { entry }
    }

    #[inline]
    #[must_use]
    pub const fn new_leaf(leaf: Pde4M) -> Self {
        Self { leaf_4m: leaf }
    }

    #[inline]
    #[must_use]
    pub const fn present(self) -> bool {
        self.into_bits() & PRESENT_BIT != 0
    }

    /// `true` if the `PS` bit selects the 4 MiB form (regardless of presence).
    #[inline]
    #[must_use]
    pub const fn large_page(self) -> bool {
        self.into_bits() & PS_BIT != 0
    }

    /// Construct union from raw `bits` (no validation).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Extract raw `bits` back from the union.
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        // SAFETY: every field is a plain 32-bit value.
        unsafe { self.bits }
    }

    /// **Typed read-only view** chosen by the **PS** bit.
    ///
    /// - If PS=1 → [`L2View::Leaf4M`]
    /// - If PS=0 → [`L2View::Entry`]
    #[inline]
    #[must_use]
    pub const fn view(self) -> L2View {
        // SAFETY: every field is a plain 32-bit value.
        unsafe {
            if self.large_page() {
                L2View::Leaf4M(self.leaf_4m)
            } else {
                L2View::Entry(self.entry)
            }
        }
    }

    /// Decode the entry into its semantic kind, or `None` if not present.
    ///
    /// - When `PS=1`, returns [`PdEntryKind::Leaf4MiB`] with a 4 MiB page base.
    /// - When `PS=0`, returns [`PdEntryKind::NextPageTable`] with a PT base.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.present() {
            return None;
        }

        Some(match self.view() {
            L2View::Entry(entry) => PdEntryKind::NextPageTable(entry.page_table(), entry),
            L2View::Leaf4M(entry) => PdEntryKind::Leaf4MiB(entry.physical_page(), entry),
        })
    }

    /// Create a non-leaf PDE that points to a Page Table (`PS=0`).
    ///
    /// Sets `present=1`, forces `PS=0`, and writes the PT base address.
    #[inline]
    #[must_use]
    pub const fn present_table(flags: Pde, table: PhysicalPage<Size4K>) -> Self {
        let entry = flags.with_present(true).with_page_table(table);
        Self::from_bits(entry.into_bits() & !PS_BIT)
    }

    /// Create a 4 MiB leaf PDE (`PS=1`).
    ///
    /// Sets `present=1`, forces `PS=1`, and writes the page base address.
    #[inline]
    #[must_use]
    pub const fn present_large(flags: Pde4M, page: PhysicalPage<Size4M>) -> Self {
        Self::new_leaf(
            flags
                .with_present(true)
                .with_page_size(true)
                .with_physical_page(page),
        )
    }
}

impl PartialEq for PdEntry {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.into_bits() == other.into_bits()
    }
}

impl Eq for PdEntry {}

impl fmt::Debug for PdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => write!(f, "PdEntry(not present, 0x{:08X})", self.into_bits()),
            Some(PdEntryKind::NextPageTable(table, _)) => write!(f, "PdEntry(table {table})"),
            Some(PdEntryKind::Leaf4MiB(page, _)) => write!(f, "PdEntry(4M leaf {page})"),
        }
    }
}

impl From<Pde> for PdEntry {
    #[inline]
    fn from(e: Pde) -> Self {
        Self::new_entry(e)
    }
}

impl From<Pde4M> for PdEntry {
    #[inline]
    fn from(e: Pde4M) -> Self {
        Self::new_leaf(e)
    }
}
