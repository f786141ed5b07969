//! # Process Memory Pinning
//!
//! Locks a range of a process' memory resident so it can be touched at
//! elevated interrupt priority. The host facility (attach to the process,
//! probe and lock the pages, detach) is modelled by [`ProcessPinner`];
//! [`PinnedRange`] releases the lock when it goes out of scope.

use core::fmt;
use kernel_memory_addresses::VirtualAddress;
use log::{debug, warn};

/// The host's facility for locking process memory.
pub trait ProcessPinner {
    /// Identifies the process whose memory is pinned.
    type Process;

    /// Host bookkeeping for one pinned range.
    type Descriptor;

    /// Lock `len` bytes starting at `start` in `process`.
    ///
    /// Returns `None` if the range could not be locked.
    fn pin(
        &mut self,
        process: &Self::Process,
        start: VirtualAddress,
        len: usize,
    ) -> Option<Self::Descriptor>;

    /// Unlock a range locked by [`pin`](Self::pin).
    fn unpin(&mut self, process: &Self::Process, descriptor: Self::Descriptor);
}

/// Pinning a process range failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PinError {
    #[error("cannot pin an empty range")]
    EmptyRange,
    #[error("failed to pin {len} bytes at {start}")]
    PinFailed { start: VirtualAddress, len: usize },
}

/// A pinned range of process memory; unpinned on drop.
pub struct PinnedRange<'p, P: ProcessPinner> {
    pinner: &'p mut P,
    process: P::Process,
    descriptor: Option<P::Descriptor>,
    start: VirtualAddress,
    len: usize,
}

impl<'p, P: ProcessPinner> PinnedRange<'p, P> {
    /// Pin `len` bytes at `start` in `process`.
    ///
    /// # Errors
    /// - [`PinError::EmptyRange`] if `len` is zero.
    /// - [`PinError::PinFailed`] if the host could not lock the range.
    pub fn pin(
        pinner: &'p mut P,
        process: P::Process,
        start: VirtualAddress,
        len: usize,
    ) -> Result<Self, PinError> {
        if len == 0 {
            return Err(PinError::EmptyRange);
        }

        let Some(descriptor) = pinner.pin(&process, start, len) else {
            warn!("Failed to pin {len} bytes at {start}");
            return Err(PinError::PinFailed { start, len });
        };

        debug!("Pinned {len} bytes at {start}");
        Ok(Self {
            pinner,
            process,
            descriptor: Some(descriptor),
            start,
            len,
        })
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; empty ranges are rejected by [`pin`](Self::pin).
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The host's descriptor of the locked range.
    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> Option<&P::Descriptor> {
        self.descriptor.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn process(&self) -> &P::Process {
        &self.process
    }
}

impl<P: ProcessPinner> fmt::Debug for PinnedRange<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedRange")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl<P: ProcessPinner> Drop for PinnedRange<'_, P> {
    fn drop(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            self.pinner.unpin(&self.process, descriptor);
            debug!("Unpinned {} bytes at {}", self.len, self.start);
        }
    }
}
