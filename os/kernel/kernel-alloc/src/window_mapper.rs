//! # Window Entry Mapper
//!
//! Maps paging entries at elevated interrupt priority by re-pointing a free
//! [`PagingContext`] slot at the page that holds the entry:
//!
//! 1. take the lowest free slot,
//! 2. write the slot's PTE with the entry's 4 KiB frame,
//! 3. invalidate the slot's TLB entry,
//! 4. hand out `slot + offset of the entry within its page`.
//!
//! Unmapping restores the slot's original PTE, invalidates again and returns
//! the slot. No step blocks or allocates.

use crate::PagingContext;
use core::ptr::NonNull;
use kernel_info::memory::PAGE_SIZE_SMALL;
use kernel_memory_addresses::{PhysicalAddress, Size4K};
use kernel_vmem::page_table::pt::{PtEntry, Pte};
use kernel_vmem::{EntryMapper, TlbInvalidate};
use log::{error, trace, warn};

/// [`EntryMapper`] over the slots of a [`PagingContext`].
pub struct WindowEntryMapper<'c, T: TlbInvalidate> {
    context: &'c mut PagingContext,
    tlb: T,
}

impl<'c, T: TlbInvalidate> WindowEntryMapper<'c, T> {
    #[inline]
    pub const fn new(context: &'c mut PagingContext, tlb: T) -> Self {
        Self { context, tlb }
    }

    /// The context the slots come from.
    #[inline]
    #[must_use]
    pub const fn context(&self) -> &PagingContext {
        &*self.context
    }
}

impl<T: TlbInvalidate> EntryMapper for WindowEntryMapper<'_, T> {
    fn map_entry(&mut self, pa: PhysicalAddress) -> Option<NonNull<u32>> {
        let Some(slot) = self.context.alloc_page() else {
            warn!("No free slot to map paging entry at {pa}");
            return None;
        };
        let index = self.context.slot_index(slot)?;

        let (page, offset) = pa.split::<Size4K>();
        // SAFETY: the slot was just allocated to us; the TLB is flushed below.
        unsafe {
            self.context
                .point_slot(index, PtEntry::make_4k(page, Pte::new_common_rw()));
        }
        self.tlb.invalidate(slot);
        trace!("Slot {index} now maps {page}");

        // SAFETY: `offset` is below the page size, so the pointer stays in the slot.
        Some(unsafe { slot.add(offset.as_usize()) }.cast())
    }

    unsafe fn unmap_entry(&mut self, entry: NonNull<u32>) {
        let offset = entry.addr().get() & (PAGE_SIZE_SMALL as usize - 1);
        // SAFETY: `entry` was produced by `map_entry`, so it lies `offset` bytes into a slot.
        let slot = unsafe { entry.cast::<u8>().sub(offset) };
        let Some(index) = self.context.slot_index(slot) else {
            error!("Unmapping {:p}, which is not inside a mapping slot", entry.as_ptr());
            panic!("entry {:p} was not mapped through this window", entry.as_ptr());
        };

        // SAFETY: the slot is still allocated to us; it is freed after the flush.
        unsafe { self.context.restore_slot(index) };
        self.tlb.invalidate(slot);
        self.context.free_page(slot);
    }
}
