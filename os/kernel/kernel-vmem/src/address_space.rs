//! # Address Space (x86, page-directory rooted)
//!
//! A view of one virtual address space, the tree rooted at the page directory
//! referenced by `CR3`. Every entry access goes through the space's
//! [`EntryMapper`], so the same code runs with a blocking host mapper at
//! passive level and with a window mapper at elevated interrupt priority.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map_in_pde`] makes the directory entry for a VA addressable.
//! - [`AddressSpace::map_in_pte`] makes the table entry for a VA addressable.
//! - [`AddressSpace::translate`] resolves a VA to its PA (handles 4 MiB pages).
//!
//! ## Mapping discipline
//!
//! At most one entry is mapped at a time. [`map_in_pte`](AddressSpace::map_in_pte)
//! reads the directory entry and releases it before mapping the table entry,
//! so the caller holds exactly one mapping when it returns `Some`.

use crate::addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use crate::page_table::pd::{L2Index, PdEntry, PdEntryKind};
use crate::page_table::pt::{L1Index, PtEntry};
use crate::page_table::{pde_address, pte_address};
use crate::{EntryMapper, MapError, MappedEntry};
use log::trace;

/// The page directory root page for an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: EntryMapper> {
    root: RootPage,
    mapper: &'m mut M,
}

impl<'m, M: EntryMapper> AddressSpace<'m, M> {
    /// View the **currently active** address space by reading CR3.
    ///
    /// # Safety
    /// - Must run at CPL0 with paging enabled and PAE disabled.
    /// - Assumes CR3 points at a valid page directory.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline]
    pub unsafe fn from_current(mapper: &'m mut M) -> Self {
        let root = unsafe { crate::read_cr3_phys() };
        Self { root, mapper }
    }

    /// View the address space rooted at the page directory in `root`.
    #[inline]
    pub const fn from_root(mapper: &'m mut M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the page directory.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// Map the page directory entry that translates `va`.
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if the mapper could not map the entry.
    pub fn map_in_pde(
        &mut self,
        va: VirtualAddress,
    ) -> Result<MappedEntry<'_, M, PdEntry>, MapError> {
        let pa = pde_address(self.root, L2Index::from(va));
        trace!("Mapping PDE for {va} at {pa}");
        MappedEntry::map(&mut *self.mapper, pa)
    }

    /// Map the page table entry that translates `va`.
    ///
    /// Returns `Ok(None)` if the directory entry is not present or maps a
    /// 4 MiB page (there is no page table to map into).
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if either entry could not be mapped.
    pub fn map_in_pte(
        &mut self,
        va: VirtualAddress,
    ) -> Result<Option<MappedEntry<'_, M, PtEntry>>, MapError> {
        let pde = self.map_in_pde(va)?.read();
        let Some(PdEntryKind::NextPageTable(table, _)) = pde.kind() else {
            return Ok(None);
        };

        let pa = pte_address(table, L1Index::from(va));
        trace!("Mapping PTE for {va} at {pa}");
        MappedEntry::map(&mut *self.mapper, pa).map(Some)
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    ///
    /// Handles 4 MiB leaves by adding the appropriate **in-page offset**.
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if an entry on the way could not be mapped.
    pub fn translate(&mut self, va: VirtualAddress) -> Result<Option<PhysicalAddress>, MapError> {
        match self.read_pde(L2Index::from(va))?.kind() {
            None => Ok(None),
            Some(PdEntryKind::Leaf4MiB(page, _)) => Ok(Some(page.join(va.offset::<Size4M>()))),
            Some(PdEntryKind::NextPageTable(table, _)) => {
                let pte = self.read_pte(table, L1Index::from(va))?;
                Ok(pte
                    .page_4k()
                    .map(|(page, _)| page.join(va.offset::<Size4K>())))
            }
        }
    }

    /// Read directory entry `l2` by value; the mapping is released before returning.
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if the entry could not be mapped.
    pub fn read_pde(&mut self, l2: L2Index) -> Result<PdEntry, MapError> {
        let entry = MappedEntry::<M, PdEntry>::map(&mut *self.mapper, pde_address(self.root, l2))?;
        Ok(entry.read())
    }

    /// Read entry `l1` of the page table in `table` by value; the mapping is
    /// released before returning.
    ///
    /// # Errors
    /// [`MapError::MappingFailed`] if the entry could not be mapped.
    pub fn read_pte(&mut self, table: PhysicalPage<Size4K>, l1: L1Index) -> Result<PtEntry, MapError> {
        let entry = MappedEntry::<M, PtEntry>::map(&mut *self.mapper, pte_address(table, l1))?;
        Ok(entry.read())
    }
}
