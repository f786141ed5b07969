//! # Reverse Page Walk
//!
//! Enumerates every virtual address of an address space whose translation
//! ends in a given physical page, i.e. the inverse of
//! [`AddressSpace::translate`].
//!
//! The walk keeps a cursor `(directory index, table index)` and scans the
//! paging structures in ascending virtual-address order:
//!
//! - a directory entry that is not present is skipped;
//! - a 4 MiB directory entry matches if its frame is the 4 MiB frame that
//!   contains the target; the reported address is the start of the large page;
//! - a directory entry pointing to a page table has its entries scanned from
//!   the cursor's table index on, and every present entry naming the target
//!   frame is reported.
//!
//! No entry stays mapped between calls, so a walk can be suspended for as
//! long as the caller likes and resumed later (the paging structures may have
//! changed in the meantime; the walk then reports what it finds). A mapping
//! failure is reported as an error without moving the cursor, so the same
//! call can simply be repeated.

use crate::addresses::{MemoryAddressOffset, PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use crate::info::ENTRIES_PER_TABLE;
use crate::page_table::join_indices;
use crate::page_table::pd::{L2Index, PdEntryKind};
use crate::page_table::pt::L1Index;
use crate::{AddressSpace, EntryMapper, MapError};
use core::iter::FusedIterator;
use log::{debug, info};

/// A reverse page walk could not make progress.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    /// An entry could not be mapped; the cursor still points at it.
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Iterator over the virtual addresses mapping one physical page.
///
/// Yields addresses in ascending order. For a 4 KiB mapping the address is
/// the page base; for a 4 MiB mapping it is the base of the large page (the
/// low 22 bits are zero). After the last match the walk is exhausted and keeps
/// returning `None`.
pub struct PageWalk<'m, M: EntryMapper> {
    space: AddressSpace<'m, M>,
    target: PhysicalPage<Size4K>,
    dir: u16,
    table: u16,
    exhausted: bool,
}

impl<'m, M: EntryMapper> PageWalk<'m, M> {
    /// Start a walk over the address space rooted at `root` for the page
    /// containing `target`.
    pub fn new(mapper: &'m mut M, root: PhysicalPage<Size4K>, target: PhysicalAddress) -> Self {
        Self::in_space(AddressSpace::from_root(mapper, root), target)
    }

    /// Start a walk over the currently active address space.
    ///
    /// # Safety
    /// Same requirements as [`AddressSpace::from_current`].
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    pub unsafe fn from_current(mapper: &'m mut M, target: PhysicalAddress) -> Self {
        Self::in_space(unsafe { AddressSpace::from_current(mapper) }, target)
    }

    fn in_space(space: AddressSpace<'m, M>, target: PhysicalAddress) -> Self {
        let target = target.page::<Size4K>();
        info!(
            "Starting reverse walk for {target} in directory {}",
            space.root_page()
        );
        Self {
            space,
            target,
            dir: 0,
            table: 0,
            exhausted: false,
        }
    }

    /// The physical page being searched for.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> PhysicalPage<Size4K> {
        self.target
    }

    /// Current `(directory index, table index)` position.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> (u16, u16) {
        (self.dir, self.table)
    }

    /// `true` once the whole address space has been scanned.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Find the next virtual address mapping the target page.
    ///
    /// Returns `Ok(None)` once every directory entry has been examined, and on
    /// every call after that.
    ///
    /// # Errors
    /// [`WalkError::Map`] if an entry could not be mapped. The cursor is left
    /// on that entry.
    pub fn next_match(&mut self) -> Result<Option<VirtualAddress>, WalkError> {
        if self.exhausted {
            return Ok(None);
        }

        let target_4m = self.target.base().page::<Size4M>();

        while usize::from(self.dir) < ENTRIES_PER_TABLE {
            let l2 = L2Index::new(self.dir);
            match self.space.read_pde(l2)?.kind() {
                None => self.next_directory(),
                Some(PdEntryKind::Leaf4MiB(page, _)) => {
                    self.next_directory();
                    if page == target_4m {
                        let va = join_indices(l2, L1Index::new(0), MemoryAddressOffset::zero());
                        debug!("{} mapped by 4 MiB page at {va}", self.target);
                        return Ok(Some(va));
                    }
                }
                Some(PdEntryKind::NextPageTable(table, _)) => {
                    while usize::from(self.table) < ENTRIES_PER_TABLE {
                        let l1 = L1Index::new(self.table);
                        let pte = self.space.read_pte(table, l1)?;
                        self.table += 1;

                        if let Some((page, _)) = pte.page_4k()
                            && page == self.target
                        {
                            if usize::from(self.table) == ENTRIES_PER_TABLE {
                                self.next_directory();
                            }
                            let va = join_indices(l2, l1, MemoryAddressOffset::zero());
                            debug!("{} mapped at {va}", self.target);
                            return Ok(Some(va));
                        }
                    }
                    self.next_directory();
                }
            }
        }

        debug!("Reverse walk for {} exhausted", self.target);
        self.exhausted = true;
        Ok(None)
    }

    #[inline]
    const fn next_directory(&mut self) {
        self.dir += 1;
        self.table = 0;
    }
}

impl<M: EntryMapper> Iterator for PageWalk<'_, M> {
    type Item = Result<VirtualAddress, WalkError>;

    /// See [`PageWalk::next_match`]. An error does not end the iteration;
    /// calling `next` again retries the entry that failed.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_match().transpose()
    }
}

impl<M: EntryMapper> FusedIterator for PageWalk<'_, M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::pd::{PdEntry, Pde, Pde4M};
    use crate::page_table::pt::{PtEntry, Pte};
    use crate::test_phys::TestPhys;

    #[test]
    fn empty_directory_has_no_match() {
        let mut phys = TestPhys::with_frames(4);
        let root = phys.alloc_4k();
        let mut walk = PageWalk::new(&mut phys, root, PhysicalAddress::new(0x1000));
        assert_eq!(walk.next_match(), Ok(None));
        assert!(walk.is_exhausted());
        assert_eq!(walk.cursor(), (1024, 0));
        assert_eq!(walk.next_match(), Ok(None));
    }

    #[test]
    fn failure_keeps_cursor_and_retries() {
        let mut phys = TestPhys::with_frames(4);
        let root = phys.alloc_4k();
        let table = phys.alloc_4k();
        let target = PhysicalPage::<Size4K>::from_number(0x777);
        phys.set_pde(root, L2Index::new(2), PdEntry::present_table(Pde::new_common_rw(), table));
        phys.set_pte(table, L1Index::new(5), PtEntry::make_4k(target, Pte::new_common_rw()));

        // Directory entries 0, 1, 2 and table entries 0..=2 succeed.
        phys.fail_once_after(6);
        let mut walk = PageWalk::new(&mut phys, root, target.base());
        assert_eq!(
            walk.next_match(),
            Err(WalkError::Map(MapError::MappingFailed(PhysicalAddress::new(
                table.base().as_u32() + 3 * 4
            ))))
        );
        assert_eq!(walk.cursor(), (2, 3));

        assert_eq!(walk.next_match(), Ok(Some(VirtualAddress::new(0x0080_5000))));
        assert_eq!(walk.cursor(), (2, 6));
    }

    #[test]
    fn large_page_ignores_offset_within_4m_frame() {
        let mut phys = TestPhys::with_frames(4);
        let root = phys.alloc_4k();
        phys.set_pde(
            root,
            L2Index::new(0x300),
            PdEntry::present_large(Pde4M::new_common_rw(), PhysicalPage::from_number(0x10)),
        );

        // Any 4 KiB page inside 0x0400_0000..0x0440_0000 matches.
        let mut walk = PageWalk::new(&mut phys, root, PhysicalAddress::new(0x0423_4567));
        assert_eq!(walk.next_match(), Ok(Some(VirtualAddress::new(0xC000_0000))));
        assert_eq!(walk.cursor(), (0x301, 0));
        assert_eq!(walk.next_match(), Ok(None));
    }
}
