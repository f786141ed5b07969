//! # Paging Layout

/// Size of a small page mapped by a page table entry.
pub const PAGE_SIZE_SMALL: u32 = 0x1000;

/// Size of a large page mapped directly by a page directory entry (PS=1).
pub const PAGE_SIZE_LARGE: u32 = 0x40_0000;

/// Number of entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Size of a single directory or table entry in bytes.
pub const PAGING_ENTRY_SIZE: u32 = 4;

/// Number of slots a paging context reserves when the caller has no better estimate.
///
/// The reverse walk needs at most one slot at a time; the remainder is left for
/// other elevated-priority users of the same context.
pub const DEFAULT_MAPPING_SLOTS: usize = 64;

/// Upper bound on the number of slots a single paging context may reserve.
pub const MAX_MAPPING_SLOTS: usize = ENTRIES_PER_TABLE;

const _: () = {
    assert!(PAGE_SIZE_SMALL.is_power_of_two());
    assert!(PAGE_SIZE_LARGE.is_power_of_two());
    assert!(PAGE_SIZE_SMALL as usize * ENTRIES_PER_TABLE == PAGE_SIZE_LARGE as usize);
    assert!(PAGING_ENTRY_SIZE as usize * ENTRIES_PER_TABLE == PAGE_SIZE_SMALL as usize);
    assert!(DEFAULT_MAPPING_SLOTS <= MAX_MAPPING_SLOTS);
};
