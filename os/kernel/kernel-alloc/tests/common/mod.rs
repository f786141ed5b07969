#![allow(dead_code)]

use kernel_alloc::{HostPhysMapper, RawPageSupplier};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::TlbInvalidate;
use kernel_vmem::page_table::pd::{L2Index, PdEntry, Pde};
use kernel_vmem::page_table::pt::{PtEntry, Pte};
use kernel_vmem::page_table::{pde_address, pte_address, split_indices};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

pub const PAGE: usize = 4096;

#[repr(C, align(4096))]
pub struct Frame(pub [u32; 1024]);

/// Synthetic physical memory reached through the host mapping facility.
pub struct Ram {
    frames: Vec<Frame>,
    next: u32,
    pub outstanding: usize,
    pub fail_after: Option<usize>,
}

impl Ram {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| Frame([0; 1024])).collect(),
            next: 0,
            outstanding: 0,
            fail_after: None,
        }
    }

    pub fn alloc_4k(&mut self) -> PhysicalPage<Size4K> {
        let page = PhysicalPage::from_number(self.next);
        self.next += 1;
        page
    }

    pub fn load(&self, pa: PhysicalAddress) -> u32 {
        let (frame, off) = pa.split::<Size4K>();
        self.frames[frame.number() as usize].0[off.as_usize() / 4]
    }

    pub fn store(&mut self, pa: PhysicalAddress, value: u32) {
        let (frame, off) = pa.split::<Size4K>();
        self.frames[frame.number() as usize].0[off.as_usize() / 4] = value;
    }

    pub fn frames_ptr(&self) -> *const Frame {
        self.frames.as_ptr()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl HostPhysMapper for Ram {
    fn map_physical(&mut self, pa: PhysicalAddress, len: usize) -> Option<NonNull<u8>> {
        if let Some(left) = self.fail_after.as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }

        let (frame, off) = pa.split::<Size4K>();
        assert!(off.as_usize() + len <= PAGE, "mapping crosses a frame");
        let frame = self.frames.get_mut(frame.number() as usize)?;
        self.outstanding += 1;
        let base = NonNull::from(frame).cast::<u8>();
        Some(unsafe { base.add(off.as_usize()) })
    }

    unsafe fn unmap_physical(&mut self, _ptr: NonNull<u8>, len: usize) {
        assert_eq!(len, 4);
        assert!(self.outstanding > 0, "unbalanced unmap");
        self.outstanding -= 1;
    }
}

/// Heap pages standing in for the host's non-paged pool. Hands out a single
/// reservation at a time.
pub struct HeapPages {
    base: NonNull<u8>,
    capacity: usize,
    handed_out: Option<usize>,
    pub refuse: bool,
    pub released: usize,
}

impl HeapPages {
    pub fn new(capacity: usize) -> Self {
        let base = NonNull::new(unsafe { alloc_zeroed(Self::layout(capacity)) }).expect("heap");
        Self {
            base,
            capacity,
            handed_out: None,
            refuse: false,
            released: 0,
        }
    }

    fn layout(pages: usize) -> Layout {
        Layout::from_size_align(pages * PAGE, PAGE).unwrap()
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn in_use(&self) -> bool {
        self.handed_out.is_some()
    }
}

impl RawPageSupplier for HeapPages {
    fn allocate_pages(&mut self, count: usize) -> Option<NonNull<u8>> {
        if self.refuse || self.handed_out.is_some() || count > self.capacity {
            return None;
        }
        self.handed_out = Some(count);
        Some(self.base)
    }

    unsafe fn free_pages(&mut self, base: NonNull<u8>, count: usize) {
        assert_eq!(base, self.base);
        assert_eq!(self.handed_out.take(), Some(count));
        self.released += 1;
    }
}

impl Drop for HeapPages {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), Self::layout(self.capacity)) }
    }
}

/// The 32-bit address the paging structures see for a host pointer.
pub fn slot_va(ptr: NonNull<u8>) -> VirtualAddress {
    VirtualAddress::new(ptr.addr().get() as u32)
}

/// The PTE value slot `i` has before a paging context touches it.
pub fn original_pte(i: usize) -> PtEntry {
    PtEntry::make_4k(
        PhysicalPage::from_number(0x8_0000 + i as u32),
        Pte::new_common_rw(),
    )
}

/// Build a directory translating `pages` pages at `base` through page tables.
///
/// Returns the directory and the physical address of every page's PTE.
pub fn window_tables(
    ram: &mut Ram,
    base: NonNull<u8>,
    pages: usize,
) -> (PhysicalPage<Size4K>, Vec<PhysicalAddress>) {
    let root = ram.alloc_4k();
    let mut tables: Vec<(L2Index, PhysicalPage<Size4K>)> = Vec::new();
    let mut ptes = Vec::with_capacity(pages);

    for i in 0..pages {
        let (l2, l1, _) = split_indices(slot_va(unsafe { base.add(i * PAGE) }));
        let table = if let Some(&(_, table)) = tables.iter().find(|(dir, _)| *dir == l2) {
            table
        } else {
            let table = ram.alloc_4k();
            let pde = PdEntry::present_table(Pde::new_common_rw(), table);
            ram.store(pde_address(root, l2), pde.into_bits());
            tables.push((l2, table));
            table
        };

        let pte = pte_address(table, l1);
        ram.store(pte, original_pte(i).into_bits());
        ptes.push(pte);
    }
    (root, ptes)
}

/// Records every invalidated page.
#[derive(Default)]
pub struct RecordingTlb {
    pub flushed: Vec<usize>,
}

impl TlbInvalidate for RecordingTlb {
    fn invalidate(&mut self, page: NonNull<u8>) {
        self.flushed.push(page.addr().get());
    }
}

/// Emulates the MMU for slot pages: on invalidation the frame a slot's PTE
/// names is copied into the slot, so reads through the slot see it.
pub struct CopyingTlb {
    frames: *const Frame,
    frame_count: usize,
    window: usize,
    ptes: Vec<*const u32>,
}

impl CopyingTlb {
    pub fn new(ram: &Ram, window: NonNull<u8>, ptes: &[PhysicalAddress]) -> Self {
        let frames = ram.frames_ptr();
        let ptes = ptes
            .iter()
            .map(|pa| {
                let (frame, off) = pa.split::<Size4K>();
                unsafe {
                    frames
                        .add(frame.number() as usize)
                        .cast::<u32>()
                        .add(off.as_usize() / 4)
                }
            })
            .collect();
        Self {
            frames,
            frame_count: ram.frame_count(),
            window: window.addr().get(),
            ptes,
        }
    }
}

impl TlbInvalidate for CopyingTlb {
    fn invalidate(&mut self, page: NonNull<u8>) {
        let index = (page.addr().get() - self.window) / PAGE;
        let pte = PtEntry::from_bits(unsafe { self.ptes[index].read_volatile() });
        if let Some((frame, _)) = pte.page_4k() {
            let frame = frame.number() as usize;
            if frame < self.frame_count {
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        self.frames.add(frame).cast::<u8>(),
                        page.as_ptr(),
                        PAGE,
                    );
                }
            }
        }
    }
}
