//! # Paging Context
//!
//! A window of pre-reserved kernel pages ("slots") whose page table entries
//! stay mapped for the lifetime of the context. Handing out a slot is a
//! bitmap operation, so it works at interrupt priorities where the host
//! allocator and mapper must not be called.
//!
//! ```text
//!  base                                                  base + n * 4 KiB
//!  ┌────────┬────────┬────────┬──────── ─ ─ ─ ┬────────┐
//!  │ slot 0 │ slot 1 │ slot 2 │                │ slot n-1│
//!  └───┬────┴───┬────┴───┬────┴──────── ─ ─ ─ ┴───┬────┘
//!      │        │        │                        │
//!     PTE      PTE      PTE        ...           PTE     (mapped at init, original value saved)
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`PagingContext::init`] (passive level) reserves the pages, maps each
//!    slot's PTE through a blocking mapper and records its original value.
//! 2. [`PagingContext::alloc_page`] / [`PagingContext::free_page`] at any level.
//! 3. [`PagingContext::end`] (passive level) unmaps the PTEs and returns the pages.
//!
//! The bitmap stores `1` for a free slot; slots are handed out lowest first.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use kernel_info::memory::{MAX_MAPPING_SLOTS, PAGE_SIZE_SMALL};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::page_table::pd::L2Index;
use kernel_vmem::page_table::pt::PtEntry;
use kernel_vmem::{AddressSpace, EntryMapper, MapError};
use log::{debug, error, info, warn};

use crate::RawPageSupplier;

const SLOT_SIZE: usize = PAGE_SIZE_SMALL as usize;
const WORD_BITS: usize = u32::BITS as usize;

/// Setting up a [`PagingContext`] failed. Nothing stays reserved or mapped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingContextError {
    #[error("a paging context needs at least one slot")]
    ZeroSlots,
    #[error("{requested} slots requested, at most {max} are supported")]
    TooManySlots { requested: usize, max: usize },
    #[error("the host could not reserve {0} pages")]
    ReservationFailed(usize),
    #[error("slot page {0} is backed by a 4 MiB page")]
    LargePageBacking(VirtualAddress),
    #[error("slot page {0} has no page table")]
    SlotTableUnmapped(VirtualAddress),
    #[error(transparent)]
    Map(#[from] MapError),
}

/// The page table entry translating one slot.
struct Slot {
    entry: NonNull<u32>,
    original: PtEntry,
}

/// A pool of pre-mapped slot pages.
pub struct PagingContext {
    base: NonNull<u8>,
    root: PhysicalPage<Size4K>,
    slots: Box<[Slot]>,
    bitmap: Box<[u32]>,
    free: usize,
}

// SAFETY: the slot pages and their PTE mappings are non-paged kernel memory
// valid from any thread; mutation requires `&mut self`.
unsafe impl Send for PagingContext {}

impl PagingContext {
    /// Reserve `num_pages` slot pages and map their page table entries.
    ///
    /// `mapper` may block; `root` is the page directory translating the
    /// reserved pages (normally the current `CR3`). Call at passive level.
    ///
    /// # Errors
    /// - [`PagingContextError::ZeroSlots`] / [`PagingContextError::TooManySlots`]
    ///   for an invalid `num_pages`.
    /// - [`PagingContextError::ReservationFailed`] if the supplier had no pages.
    /// - [`PagingContextError::LargePageBacking`] / [`PagingContextError::SlotTableUnmapped`]
    ///   if a slot is not translated by its own page table entry.
    /// - [`PagingContextError::Map`] if a slot PTE could not be mapped.
    pub fn init<S: RawPageSupplier, M: EntryMapper>(
        supplier: &mut S,
        mapper: &mut M,
        root: PhysicalPage<Size4K>,
        num_pages: usize,
    ) -> Result<Self, PagingContextError> {
        if num_pages == 0 {
            return Err(PagingContextError::ZeroSlots);
        }
        if num_pages > MAX_MAPPING_SLOTS {
            return Err(PagingContextError::TooManySlots {
                requested: num_pages,
                max: MAX_MAPPING_SLOTS,
            });
        }

        let Some(base) = supplier.allocate_pages(num_pages) else {
            warn!("Host could not reserve {num_pages} slot pages");
            return Err(PagingContextError::ReservationFailed(num_pages));
        };
        debug_assert_eq!(base.addr().get() % SLOT_SIZE, 0, "slot window not page aligned");

        let mut slots = Vec::with_capacity(num_pages);
        if let Err(e) = Self::map_slot_entries(mapper, root, base, num_pages, &mut slots) {
            warn!("Paging context setup failed: {e}");
            for slot in slots {
                // SAFETY: each entry was mapped by `mapper` and released only here.
                unsafe { mapper.unmap_entry(slot.entry) };
            }
            // SAFETY: `base` is the reservation made above; nothing refers to it.
            unsafe { supplier.free_pages(base, num_pages) };
            return Err(e);
        }

        info!(
            "Paging context with {num_pages} slots at {:p} (directory {root})",
            base.as_ptr()
        );
        Ok(Self {
            base,
            root,
            slots: slots.into_boxed_slice(),
            bitmap: initial_bitmap(num_pages),
            free: num_pages,
        })
    }

    fn map_slot_entries<M: EntryMapper>(
        mapper: &mut M,
        root: PhysicalPage<Size4K>,
        base: NonNull<u8>,
        num_pages: usize,
        slots: &mut Vec<Slot>,
    ) -> Result<(), PagingContextError> {
        let mut space = AddressSpace::from_root(mapper, root);
        for index in 0..num_pages {
            // SAFETY: `index` is within the reservation.
            let va = slot_address(unsafe { base.add(index * SLOT_SIZE) });
            let pde = space.read_pde(L2Index::from(va))?;
            if !pde.present() {
                return Err(PagingContextError::SlotTableUnmapped(va));
            }
            if pde.large_page() {
                return Err(PagingContextError::LargePageBacking(va));
            }

            let Some(pte) = space.map_in_pte(va)? else {
                return Err(PagingContextError::SlotTableUnmapped(va));
            };

            let original = pte.read();
            slots.push(Slot {
                entry: pte.into_raw(),
                original,
            });
        }
        Ok(())
    }

    /// Take the lowest free slot.
    ///
    /// Never blocks and never allocates. Returns `None` if every slot is in use.
    pub fn alloc_page(&mut self) -> Option<NonNull<u8>> {
        let Some((word_index, word)) = self
            .bitmap
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != 0)
        else {
            warn!("Paging context exhausted ({} slots in use)", self.slots.len());
            return None;
        };

        let bit = word.trailing_zeros() as usize;
        *word &= !(1 << bit);
        self.free -= 1;

        let index = word_index * WORD_BITS + bit;
        debug_assert!(index < self.slots.len());
        let slot = self.slot_ptr(index);
        debug!("Allocated slot {index} at {:p}", slot.as_ptr());
        Some(slot)
    }

    /// Return a slot taken by [`alloc_page`](Self::alloc_page).
    ///
    /// # Panics
    /// If `ptr` is not the start of a slot of this context, or the slot is
    /// already free.
    pub fn free_page(&mut self, ptr: NonNull<u8>) {
        let Some(index) = self.slot_index(ptr) else {
            error!("Freeing {:p}, which is not a slot of this paging context", ptr.as_ptr());
            panic!("pointer {:p} is not a paging context slot", ptr.as_ptr());
        };

        let (word, mask) = bit_of(index);
        if self.bitmap[word] & mask != 0 {
            error!("Slot {index} at {:p} freed twice", ptr.as_ptr());
            panic!("paging context slot {index} is already free");
        }

        self.bitmap[word] |= mask;
        self.free += 1;
        debug!("Freed slot {index} at {:p}", ptr.as_ptr());
    }

    /// Unmap the slot PTEs and release the slot pages. Call at passive level
    /// with the supplier and mapper passed to [`init`](Self::init).
    ///
    /// # Panics
    /// If any slot is still allocated.
    pub fn end<S: RawPageSupplier, M: EntryMapper>(self, supplier: &mut S, mapper: &mut M) {
        let outstanding = self.outstanding();
        if outstanding != 0 {
            error!("Ending paging context with {outstanding} slots still in use");
            panic!("paging context ended with {outstanding} outstanding slots");
        }

        for slot in &self.slots {
            // SAFETY: mapped by the init mapper and released exactly once here.
            unsafe { mapper.unmap_entry(slot.entry) };
        }
        // SAFETY: the reservation made in `init`; every slot is free.
        unsafe { supplier.free_pages(self.base, self.slots.len()) };
        info!("Paging context at {:p} ended", self.base.as_ptr());
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots available to [`alloc_page`](Self::alloc_page).
    #[inline]
    #[must_use]
    pub const fn free_slots(&self) -> usize {
        self.free
    }

    /// Number of slots currently handed out.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.slots.len() - self.free
    }

    /// `true` if `ptr` is the start of one of this context's slots.
    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.slot_index(ptr).is_some()
    }

    /// The page directory the slot PTEs were resolved in.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// Start of the slot window.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Index of the slot starting at `ptr`.
    pub(crate) fn slot_index(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = ptr.addr().get().checked_sub(self.base.addr().get())?;
        if offset % SLOT_SIZE != 0 {
            return None;
        }
        let index = offset / SLOT_SIZE;
        (index < self.slots.len()).then_some(index)
    }

    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        // SAFETY: `index` is a valid slot; the window is one reservation.
        unsafe { self.base.add(index * SLOT_SIZE) }
    }

    /// Point slot `index` at another physical page.
    ///
    /// # Safety
    /// The slot must be allocated to the caller, and its TLB entry must be
    /// invalidated before the slot is accessed.
    pub(crate) unsafe fn point_slot(&mut self, index: usize, entry: PtEntry) {
        let slot = &self.slots[index];
        unsafe { slot.entry.as_ptr().write_volatile(entry.into_bits()) }
    }

    /// Put back the PTE value slot `index` had when the context was set up.
    ///
    /// # Safety
    /// As for [`point_slot`](Self::point_slot).
    pub(crate) unsafe fn restore_slot(&mut self, index: usize) {
        let slot = &self.slots[index];
        unsafe { slot.entry.as_ptr().write_volatile(slot.original.into_bits()) }
    }
}

impl fmt::Debug for PagingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingContext")
            .field("base", &self.base)
            .field("root", &self.root)
            .field("capacity", &self.capacity())
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

/// The virtual address of a slot as seen by the paging structures.
#[allow(clippy::cast_possible_truncation)]
fn slot_address(slot: NonNull<u8>) -> VirtualAddress {
    // Kernel pointers are 32 bits wide under non-PAE paging.
    VirtualAddress::new(slot.addr().get() as u32)
}

/// Word index and mask of slot `index` in the bitmap.
const fn bit_of(index: usize) -> (usize, u32) {
    (index / WORD_BITS, 1 << (index % WORD_BITS))
}

/// A bitmap with the first `slots` bits set.
fn initial_bitmap(slots: usize) -> Box<[u32]> {
    (0..slots.div_ceil(WORD_BITS))
        .map(|word| {
            let bits = (slots - word * WORD_BITS).min(WORD_BITS);
            if bits == WORD_BITS {
                u32::MAX
            } else {
                (1 << bits) - 1
            }
        })
        .collect()
}
