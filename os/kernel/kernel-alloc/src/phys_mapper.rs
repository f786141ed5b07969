//! # Host-backed Entry Mapper
//!
//! [`HostEntryMapper`] makes paging entries addressable through the host's
//! general physical-memory mapping facility, modelled by [`HostPhysMapper`].
//! The host facility may block, so this mapper is only usable at passive
//! interrupt priority. It is what a [`PagingContext`](crate::PagingContext)
//! uses to reach its own slot PTEs during setup.
//!
//! ## See also
//! - [`EntryMapper`] trait in `kernel-vmem`
//! - [`WindowEntryMapper`](crate::WindowEntryMapper) for elevated priority

use core::ptr::NonNull;
use kernel_info::memory::PAGING_ENTRY_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::EntryMapper;
use log::warn;

/// The host's facility for mapping a physical range into kernel space.
pub trait HostPhysMapper {
    /// Map `len` bytes starting at `pa`.
    ///
    /// Returns `None` if the host could not create the mapping.
    fn map_physical(&mut self, pa: PhysicalAddress, len: usize) -> Option<NonNull<u8>>;

    /// Release a mapping made by [`map_physical`](Self::map_physical).
    ///
    /// # Safety
    /// `ptr` and `len` must match one earlier, still outstanding mapping.
    unsafe fn unmap_physical(&mut self, ptr: NonNull<u8>, len: usize);
}

/// [`EntryMapper`] implementation that delegates to a [`HostPhysMapper`].
#[derive(Debug, Default)]
pub struct HostEntryMapper<H: HostPhysMapper> {
    host: H,
}

const ENTRY_LEN: usize = PAGING_ENTRY_SIZE as usize;

impl<H: HostPhysMapper> HostEntryMapper<H> {
    #[inline]
    pub const fn new(host: H) -> Self {
        Self { host }
    }

    #[inline]
    pub const fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[inline]
    pub fn into_inner(self) -> H {
        self.host
    }
}

impl<H: HostPhysMapper> EntryMapper for HostEntryMapper<H> {
    fn map_entry(&mut self, pa: PhysicalAddress) -> Option<NonNull<u32>> {
        let Some(ptr) = self.host.map_physical(pa, ENTRY_LEN) else {
            warn!("Host could not map paging entry at {pa}");
            return None;
        };
        Some(ptr.cast())
    }

    unsafe fn unmap_entry(&mut self, entry: NonNull<u32>) {
        unsafe { self.host.unmap_physical(entry.cast(), ENTRY_LEN) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps every physical address to the same word and counts calls.
    #[derive(Default)]
    struct OneWord {
        word: u32,
        maps: usize,
        unmaps: usize,
        refuse: bool,
    }

    impl HostPhysMapper for OneWord {
        fn map_physical(&mut self, _pa: PhysicalAddress, len: usize) -> Option<NonNull<u8>> {
            assert_eq!(len, 4);
            if self.refuse {
                return None;
            }
            self.maps += 1;
            Some(NonNull::from(&mut self.word).cast())
        }

        unsafe fn unmap_physical(&mut self, _ptr: NonNull<u8>, len: usize) {
            assert_eq!(len, 4);
            self.unmaps += 1;
        }
    }

    #[test]
    fn delegates_to_host() {
        let mut mapper = HostEntryMapper::new(OneWord {
            word: 0xDEAD_BEEF,
            ..OneWord::default()
        });
        let entry = mapper.map_entry(PhysicalAddress::new(0x1000)).unwrap();
        assert_eq!(unsafe { entry.read() }, 0xDEAD_BEEF);
        unsafe { mapper.unmap_entry(entry) };
        assert_eq!(mapper.host().maps, 1);
        assert_eq!(mapper.host().unmaps, 1);
    }

    #[test]
    fn host_refusal_is_none() {
        let mut mapper = HostEntryMapper::new(OneWord {
            refuse: true,
            ..OneWord::default()
        });
        assert!(mapper.map_entry(PhysicalAddress::new(0x1000)).is_none());
        assert_eq!(mapper.host_mut().unmaps, 0);
    }
}
