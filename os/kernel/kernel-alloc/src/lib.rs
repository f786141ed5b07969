//! # Kernel Page Mapping at Elevated Interrupt Priority
//!
//! The host's general purpose mapping facility may block and therefore only
//! runs at passive interrupt priority. This crate provides what is needed to
//! keep touching paging structures above that level, and the host contracts
//! everything is built on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        Reverse page walk (kernel-vmem)              │
//! │    • generic over the entry mapper                  │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ EntryMapper
//! ┌─────────────────▼───────────────────────────────────┐
//! │   HostEntryMapper         │   WindowEntryMapper     │
//! │   • passive level         │   • elevated level      │
//! │   • host mapping facility │   • slot PTE rewrite    │
//! └───────────────────────────┴───────────┬─────────────┘
//!                                         │
//! ┌───────────────────────────────────────▼─────────────┐
//! │              Paging context                         │
//! │    • pre-reserved window of slot pages              │
//! │    • bitmap of free slots                           │
//! │    • slot PTEs kept mapped for its lifetime         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! - [`paging_context`]: the slot allocator. Set up and torn down at passive
//!   level; [`PagingContext::alloc_page`] and [`PagingContext::free_page`]
//!   neither block nor allocate.
//! - [`window_mapper`]: maps one paging entry by pointing a free slot at it.
//! - [`phys_mapper`]: the host's blocking mapping facility and the entry
//!   mapper built on top of it.
//! - [`page_supplier`]: the host's non-paged page reservation.
//! - [`pinning`]: scoped locking of a process' memory range.
//!
//! ## Concurrency
//!
//! None of the types synchronize internally. A paging context is mutated
//! through `&mut self`; callers that share one across processors serialize
//! access with their own lock.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod page_supplier;
pub mod paging_context;
pub mod phys_mapper;
pub mod pinning;
pub mod window_mapper;

pub use crate::page_supplier::RawPageSupplier;
pub use crate::paging_context::{PagingContext, PagingContextError};
pub use crate::phys_mapper::{HostEntryMapper, HostPhysMapper};
pub use crate::pinning::{PinError, PinnedRange, ProcessPinner};
pub use crate::window_mapper::WindowEntryMapper;
