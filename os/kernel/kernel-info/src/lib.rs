//! # Paging Configuration
//!
//! Compile-time constants that describe the 32-bit, non-PAE paging format and
//! the default sizing of the IRQL-safe mapping pool. Every other crate in the
//! workspace takes its page sizes and table geometry from here, so there is a
//! single source of truth for the hardware layout.
//!
//! ## Paging Geometry
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! * One page directory per address space (referenced by CR3), 1024 entries.
//! * A directory entry either points at a page table (PS=0) or maps a
//!   4 MiB page directly (PS=1).
//! * A page table holds 1024 entries, each mapping one 4 KiB page.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::{ENTRIES_PER_TABLE, PAGE_SIZE_LARGE, PAGE_SIZE_SMALL};
//!
//! assert_eq!(PAGE_SIZE_SMALL * ENTRIES_PER_TABLE as u32, PAGE_SIZE_LARGE);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
