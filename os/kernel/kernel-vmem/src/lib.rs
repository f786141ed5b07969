//! # Virtual Memory Support (32-bit, non-PAE)
//!
//! Page-table helpers for a kernel that has to look at the hardware paging
//! structures directly instead of asking the host memory manager.
//!
//! ## What you get
//! - A bit-exact [`page_table`] codec for page directory and page table entries.
//! - The [`EntryMapper`] contract that makes a single 4-byte paging entry
//!   addressable, together with the scoped [`MappedEntry`] handle that releases
//!   the mapping again.
//! - An [`AddressSpace`] view rooted at a page directory (`CR3`).
//! - The [`reverse_walk`] engine that enumerates every virtual address mapping
//!   a given physical page.
//!
//! ## x86 Virtual Address → Physical Address Walk (PAE disabled)
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |   PD  |   PT  | Offset |
//! ```
//!
//! Both levels hold 1024 (2¹⁰) entries of 4 bytes each.
//!
//! ```text
//!  CR3 →  PD  →  PT  →  Physical Page
//!          │      │
//!          │      └───► PTE (Page Table Entry)     → maps 4 KiB page
//!          └──────────► PDE (Page Directory Entry) → PS=1 → 4 MiB page
//! ```
//!
//! | Level | Table name | Entry name | Description |
//! |:------|:-----------|:-----------|:------------|
//! | 2 | **PD** (Page Directory) | **PDE** | Referenced by `CR3`. If `PS=1` the entry maps a 4 MiB page directly. |
//! | 1 | **PT** (Page Table) | **PTE** | Leaf level; every present entry maps one 4 KiB page. |
//!
//! ## Mapping entries
//!
//! Paging structures live in physical memory, so every entry read goes
//! through an [`EntryMapper`]. Two families of mappers exist:
//!
//! - a blocking one that delegates to the host's general mapping facility
//!   (usable only at passive interrupt priority), and
//! - a window mapper that re-points a pre-reserved slot page at the entry
//!   (usable at elevated interrupt priority).
//!
//! Code in this crate is generic over the mapper and never holds more than
//! one mapping at a time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod mapped_entry;
pub mod page_table;
pub mod reverse_walk;

pub use crate::address_space::AddressSpace;
pub use crate::mapped_entry::MappedEntry;
pub use crate::page_table::PagingEntry;
pub use crate::reverse_walk::{PageWalk, WalkError};
pub use kernel_info::memory as info;
pub use kernel_memory_addresses as addresses;

use crate::addresses::PhysicalAddress;
use core::ptr::NonNull;

/// Makes a single paging entry, given by its physical address, addressable.
///
/// Implementations decide how the entry becomes visible: through a general
/// purpose host facility, a direct map, or a reserved mapping window. A
/// successful [`map_entry`](Self::map_entry) must be balanced by exactly one
/// [`unmap_entry`](Self::unmap_entry) with the returned pointer.
///
/// Prefer [`MappedEntry`] over calling these methods directly; it performs the
/// unmap on every exit path.
pub trait EntryMapper {
    /// Map the 4-byte entry at `pa`.
    ///
    /// Returns `None` if no mapping could be produced (resource exhaustion).
    fn map_entry(&mut self, pa: PhysicalAddress) -> Option<NonNull<u32>>;

    /// Release a mapping produced by [`map_entry`](Self::map_entry).
    ///
    /// # Safety
    /// `entry` must have been returned by `map_entry` on this mapper and not
    /// been released yet.
    unsafe fn unmap_entry(&mut self, entry: NonNull<u32>);
}

impl<M: EntryMapper + ?Sized> EntryMapper for &mut M {
    #[inline]
    fn map_entry(&mut self, pa: PhysicalAddress) -> Option<NonNull<u32>> {
        (**self).map_entry(pa)
    }

    #[inline]
    unsafe fn unmap_entry(&mut self, entry: NonNull<u32>) {
        unsafe { (**self).unmap_entry(entry) }
    }
}

/// Drops the cached translation for one page of the current address space.
pub trait TlbInvalidate {
    /// Invalidate the TLB entry for the page containing `page`.
    fn invalidate(&mut self, page: NonNull<u8>);
}

impl<T: TlbInvalidate + ?Sized> TlbInvalidate for &mut T {
    #[inline]
    fn invalidate(&mut self, page: NonNull<u8>) {
        (**self).invalidate(page);
    }
}

/// Invalidates through the `invlpg` instruction.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug)]
pub struct Invlpg {
    _private: (),
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl Invlpg {
    /// # Safety
    /// `invlpg` is privileged; the returned value may only be used at CPL0.
    #[inline]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl TlbInvalidate for Invlpg {
    #[inline]
    fn invalidate(&mut self, page: NonNull<u8>) {
        // SAFETY: constructing `Invlpg` requires CPL0.
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) page.as_ptr(), options(nostack, preserves_flags));
        }
    }
}

/// A paging entry could not be made addressable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("failed to map paging entry at physical address {0}")]
    MappingFailed(PhysicalAddress),
}

/// Read the page directory of the current address space from `CR3`.
///
/// # Safety
/// Must run at CPL0 with paging enabled and PAE disabled.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
#[must_use]
pub unsafe fn read_cr3_phys() -> addresses::PhysicalPage<addresses::Size4K> {
    use kernel_registers::LoadRegisterUnsafe;
    use kernel_registers::cr3::Cr3;
    let cr3 = unsafe { Cr3::load_unsafe() };
    cr3.page_directory()
}

#[cfg(test)]
pub(crate) mod test_phys {
    use crate::EntryMapper;
    use crate::addresses::{PhysicalAddress, PhysicalPage, Size4K};
    use crate::page_table::pd::{L2Index, PdEntry};
    use crate::page_table::pt::{L1Index, PtEntry};
    use crate::page_table::{pde_address, pte_address};
    use core::ptr::NonNull;

    /// A 4 KiB-aligned raw frame. We use this as our "physical RAM" backing store in tests.
    #[repr(C, align(4096))]
    struct Aligned4K([u32; 1024]);

    /// A tiny in-memory "RAM" whose entries are mapped by pointing into the frame.
    ///
    /// Physical addresses are byte offsets from 0; frame `n` covers
    /// `n * 4096 .. (n + 1) * 4096`. The mapper counts outstanding mappings and
    /// can be told to fail once.
    pub(crate) struct TestPhys {
        frames: Vec<Aligned4K>,
        next: u32,
        outstanding: usize,
        max_outstanding: usize,
        fail_after: Option<usize>,
    }

    impl TestPhys {
        pub(crate) fn with_frames(n: usize) -> Self {
            let mut frames = Vec::with_capacity(n);
            for _ in 0..n {
                frames.push(Aligned4K([0; 1024]));
            }
            Self {
                frames,
                next: 0,
                outstanding: 0,
                max_outstanding: 0,
                fail_after: None,
            }
        }

        /// Hand out the next zeroed frame.
        pub(crate) fn alloc_4k(&mut self) -> PhysicalPage<Size4K> {
            let page = PhysicalPage::from_number(self.next);
            self.next += 1;
            page
        }

        /// Let `n` more mappings succeed, then fail exactly one.
        pub(crate) fn fail_once_after(&mut self, n: usize) {
            self.fail_after = Some(n);
        }

        pub(crate) const fn outstanding(&self) -> usize {
            self.outstanding
        }

        pub(crate) const fn max_outstanding(&self) -> usize {
            self.max_outstanding
        }

        pub(crate) fn write(&mut self, pa: PhysicalAddress, value: u32) {
            let (frame, off) = pa.split::<Size4K>();
            self.frames[frame.number() as usize].0[off.as_usize() / 4] = value;
        }

        pub(crate) fn set_pde(&mut self, root: PhysicalPage<Size4K>, l2: L2Index, e: PdEntry) {
            self.write(pde_address(root, l2), e.into_bits());
        }

        pub(crate) fn set_pte(&mut self, table: PhysicalPage<Size4K>, l1: L1Index, e: PtEntry) {
            self.write(pte_address(table, l1), e.into_bits());
        }
    }

    impl EntryMapper for TestPhys {
        fn map_entry(&mut self, pa: PhysicalAddress) -> Option<NonNull<u32>> {
            if let Some(left) = self.fail_after.as_mut() {
                if *left == 0 {
                    self.fail_after = None;
                    return None;
                }
                *left -= 1;
            }

            let (frame, off) = pa.split::<Size4K>();
            let frame = self.frames.get_mut(frame.number() as usize)?;
            self.outstanding += 1;
            self.max_outstanding = self.max_outstanding.max(self.outstanding);
            Some(NonNull::from(&mut frame.0[off.as_usize() / 4]))
        }

        unsafe fn unmap_entry(&mut self, _entry: NonNull<u32>) {
            assert!(self.outstanding > 0, "unbalanced unmap");
            self.outstanding -= 1;
        }
    }
}
