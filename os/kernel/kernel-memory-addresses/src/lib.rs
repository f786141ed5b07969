//! # Virtual and Physical Memory Address Types (32-bit)
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! 32-bit, non-PAE paging code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u32` values:
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! These are wrapped to distinguish between the two address spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] | Refers to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory. |
//!
//! ## Page Sizes
//!
//! - [`Size4K`]: 4 KiB pages, mapped by a page table entry
//! - [`Size4M`]: 4 MiB pages, mapped directly by a page directory entry
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x1234_5678);
//! let (page, off) = pa.split::<Size4K>();
//! assert_eq!(page.number(), 0x12345);
//! assert_eq!(page.join(off), pa);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use memory_page::MemoryPage;
pub use page_size::{PageSize, Size4K, Size4M};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
