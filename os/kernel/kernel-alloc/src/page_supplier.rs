//! # Non-paged Page Reservation

use core::ptr::NonNull;

/// The host facility that reserves non-paged, page-aligned memory.
///
/// Only called at passive interrupt priority.
pub trait RawPageSupplier {
    /// Reserve `count` virtually contiguous 4 KiB pages.
    ///
    /// The returned base is 4 KiB-aligned and the pages stay resident until
    /// released. Returns `None` if the reservation cannot be satisfied.
    fn allocate_pages(&mut self, count: usize) -> Option<NonNull<u8>>;

    /// Release a reservation made by [`allocate_pages`](Self::allocate_pages).
    ///
    /// # Safety
    /// `base` and `count` must match one earlier, still outstanding
    /// reservation, and nothing may access the pages afterwards.
    unsafe fn free_pages(&mut self, base: NonNull<u8>, count: usize);
}
