//! Reserved address ranges with on-demand commit.
//!
//! A [`Region`] is the storage unit under both the arena and the heap: one
//! contiguous reservation from a [`VirtualMemory`] provider plus a
//! high-water mark of how much of it is committed. Commits only ever grow
//! the mark; the whole range is released when the region is dropped.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use bedrock_vm::VirtualMemory;
use tracing::trace;

use crate::align::{align_up, ALIGNMENT};
use crate::error::AllocError;

pub(crate) struct Region<V: VirtualMemory> {
    vm: V,
    base: NonNull<u8>,
    /// Reserved bytes.
    size: usize,
    /// Bytes committed from `base`. Multiple of `granularity` until it
    /// reaches `size`.
    committed: usize,
    granularity: usize,
}

impl<V: VirtualMemory> Region<V> {
    /// Reserve `size` bytes (rounded up to [`ALIGNMENT`]).
    ///
    /// `granularity` is rounded up to the provider's page size.
    pub(crate) fn reserve(vm: V, size: usize, granularity: usize) -> Result<Self, AllocError> {
        let size = align_up(size, ALIGNMENT).ok_or(AllocError::SizeOverflow)?;
        let page = vm.page_size();
        let granularity = align_up(granularity.max(page), page).ok_or(AllocError::SizeOverflow)?;
        let base = vm.reserve(size)?;
        Ok(Self {
            vm,
            base,
            size,
            committed: 0,
            granularity,
        })
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    /// Pointer to `offset` bytes past the base.
    ///
    /// `offset` must be at most `size`.
    pub(crate) fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.size);
        // SAFETY: offset <= size keeps the result inside (or one past) the
        // reservation, which never wraps and is never null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Offset of `ptr` from the base, if it lies inside the reservation.
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset < self.size).then_some(offset)
    }

    /// Commit pages so that `[0, end)` is readable and writable.
    ///
    /// Commits at least `granularity` bytes at a time, capped at the end of
    /// the reservation. Fails with [`AllocError::Exhausted`] if `end` lies
    /// past the reservation.
    pub(crate) fn ensure_committed(&mut self, end: usize) -> Result<(), AllocError> {
        if end <= self.committed {
            return Ok(());
        }
        if end > self.size {
            return Err(AllocError::Exhausted {
                requested: end - self.committed,
                available: self.size - self.committed,
            });
        }
        let needed = end - self.committed;
        let chunk = align_up(needed, self.granularity)
            .unwrap_or(usize::MAX)
            .min(self.size - self.committed);
        // SAFETY: [committed, committed + chunk) lies inside the reservation
        // because chunk <= size - committed.
        unsafe { self.vm.commit(self.at(self.committed), chunk)? };
        self.committed += chunk;
        trace!(committed = self.committed, reserved = self.size, "region grew");
        Ok(())
    }
}

impl<V: VirtualMemory> Drop for Region<V> {
    fn drop(&mut self) {
        // SAFETY: base/size are exactly what `reserve` returned; the region
        // is dropped once.
        unsafe { self.vm.release(self.base, self.size) };
    }
}
