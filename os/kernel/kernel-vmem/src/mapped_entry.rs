//! # Scoped Entry Mappings

use crate::addresses::PhysicalAddress;
use crate::{EntryMapper, MapError, PagingEntry};
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

/// A paging entry made addressable through an [`EntryMapper`].
///
/// The handle owns the obligation to unmap: dropping it releases the mapping,
/// [`into_raw`](Self::into_raw) hands the obligation to the caller instead.
pub struct MappedEntry<'m, M: EntryMapper, E: PagingEntry> {
    mapper: &'m mut M,
    entry: NonNull<u32>,
    phys: PhysicalAddress,
    _kind: PhantomData<E>,
}

impl<'m, M: EntryMapper, E: PagingEntry> MappedEntry<'m, M, E> {
    /// Map the entry stored at `pa`.
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if the mapper could not produce a mapping.
    pub fn map(mapper: &'m mut M, pa: PhysicalAddress) -> Result<Self, MapError> {
        let entry = mapper.map_entry(pa).ok_or(MapError::MappingFailed(pa))?;
        Ok(Self {
            mapper,
            entry,
            phys: pa,
            _kind: PhantomData,
        })
    }

    /// Physical address of the mapped entry.
    #[inline]
    #[must_use]
    pub const fn phys(&self) -> PhysicalAddress {
        self.phys
    }

    /// Read the entry.
    #[inline]
    #[must_use]
    pub fn read(&self) -> E {
        // SAFETY: the mapper guarantees the entry stays addressable until unmapped.
        E::from_bits(unsafe { self.entry.as_ptr().read_volatile() })
    }

    /// Overwrite the entry.
    ///
    /// The caller is responsible for TLB maintenance if the entry is live.
    #[inline]
    pub fn write(&mut self, value: E) {
        // SAFETY: see `read`.
        unsafe { self.entry.as_ptr().write_volatile(value.into_bits()) }
    }

    /// Give up the handle without unmapping.
    ///
    /// The returned pointer must eventually be passed to
    /// [`EntryMapper::unmap_entry`] of the same mapper.
    #[inline]
    #[must_use]
    pub fn into_raw(self) -> NonNull<u32> {
        let this = ManuallyDrop::new(self);
        this.entry
    }
}

impl<M: EntryMapper, E: PagingEntry> Drop for MappedEntry<'_, M, E> {
    fn drop(&mut self) {
        // SAFETY: `entry` came from `map_entry` on this mapper and is released exactly once.
        unsafe { self.mapper.unmap_entry(self.entry) }
    }
}

impl<M: EntryMapper, E: PagingEntry> fmt::Debug for MappedEntry<'_, M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedEntry")
            .field("phys", &self.phys)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}
