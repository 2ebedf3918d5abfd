//! Reservation-backed bump arena.
//!
//! An [`Arena`] reserves a large address range up front and hands out
//! memory by advancing an offset. Pages are committed lazily as the offset
//! crosses the committed boundary. Memory is given back only in stack
//! order: by truncating the offset ([`Arena::deallocate_to`] and friends),
//! by closing a level, or by [`Arena::clear`].
//!
//! ```text
//! base                     allocated        committed             size
//!  │ ── live allocations ── │ ── committed, free ── │ ── reserved ── │
//! ```

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use bedrock_vm::{SystemVm, VirtualMemory};
use tracing::debug;

use crate::align::{align_up, is_aligned, ALIGNMENT};
use crate::config::ArenaConfig;
use crate::error::AllocError;
use crate::region::Region;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Bump allocator over a reserved address range.
///
/// Invariant: `0 <= allocated <= committed <= reserved`.
///
/// Not thread-safe; one arena per thread, or external locking.
pub struct Arena<V: VirtualMemory = SystemVm> {
    pub(crate) region: Region<V>,
    /// Bump offset: bytes handed out so far.
    pub(crate) allocated: usize,
    /// Start offset of the most recent allocation still fully live.
    pub(crate) top: Option<usize>,
    /// Identity used to reject levels from other arenas.
    pub(crate) id: u64,
    /// Bumped by `clear`; levels from an older epoch are stale.
    pub(crate) epoch: u32,
    /// Number of raw levels currently open.
    pub(crate) depth: u32,
}

impl Arena<SystemVm> {
    /// Reserve an arena from the operating system.
    pub fn new(config: ArenaConfig) -> Result<Self, AllocError> {
        Self::with_vm(config, SystemVm)
    }

    /// Reserve an arena of `size` bytes with default commit granularity.
    ///
    /// A `size` of zero selects the 1 GiB default.
    pub fn with_capacity(size: usize) -> Result<Self, AllocError> {
        Self::new(ArenaConfig::new(size))
    }
}

impl<V: VirtualMemory> Arena<V> {
    /// Reserve an arena from the given provider.
    ///
    /// Nothing is committed until the first allocation.
    pub fn with_vm(config: ArenaConfig, vm: V) -> Result<Self, AllocError> {
        config.validate()?;
        let region = Region::reserve(vm, config.reserve_size, config.commit_granularity)?;
        Ok(Self {
            region,
            allocated: 0,
            top: None,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
            depth: 0,
        })
    }

    /// Allocate `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// The size is rounded up to the alignment. The returned memory is not
    /// zeroed. An allocation that exactly fills the reservation succeeds;
    /// anything past it fails with [`AllocError::Exhausted`] and leaves the
    /// arena unchanged.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = align_up(size, ALIGNMENT).ok_or(AllocError::SizeOverflow)?;
        let start = align_up(self.allocated, ALIGNMENT).ok_or(AllocError::SizeOverflow)?;
        let end = start.checked_add(size).ok_or(AllocError::SizeOverflow)?;
        if end > self.region.size() {
            return Err(AllocError::Exhausted {
                requested: size,
                available: self.region.size().saturating_sub(start),
            });
        }
        self.region.ensure_committed(end)?;
        self.allocated = end;
        self.top = Some(start);
        Ok(self.region.at(start))
    }

    /// Allocate `size` zero-filled bytes.
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(size)?;
        // SAFETY: `allocate` committed at least `size` bytes at `ptr`.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Resize the block at `ptr` to `size` bytes.
    ///
    /// `ptr` must point at the start of a block inside the allocated range,
    /// otherwise the call fails with [`AllocError::ForeignPointer`] or
    /// [`AllocError::Misaligned`].
    ///
    /// The most recent allocation is resized in place: growing returns the
    /// same pointer if the reservation has room, shrinking always succeeds
    /// and gives back exactly the difference. Any older block is relocated:
    /// a fresh block is bumped at the end and the old contents (at most
    /// `size` bytes) are copied over. The old bytes stay in place until the
    /// arena is truncated past them.
    pub fn reallocate(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        let offset = self.live_offset(ptr)?;
        if self.top == Some(offset) {
            self.resize_top(offset, size)?;
            return Ok(ptr);
        }
        let available = self.allocated - offset;
        let fresh = self.allocate(size)?;
        // SAFETY: the source range [offset, offset + n) ends at or before the
        // old `allocated`, the destination starts at or after it, so both
        // are committed and disjoint.
        unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), size.min(available)) };
        Ok(fresh)
    }

    /// Truncate the arena to `position` bytes.
    ///
    /// A no-op unless `position` is strictly before the current offset.
    pub fn deallocate_to(&mut self, position: usize) {
        if position < self.allocated {
            self.allocated = position;
            if self.top.is_some_and(|top| top >= position) {
                self.top = None;
            }
        }
    }

    /// Give back the last `size` bytes (saturating at zero).
    pub fn deallocate_size(&mut self, size: usize) {
        self.deallocate_to(self.allocated.saturating_sub(size));
    }

    /// Truncate the arena to the start of `ptr`.
    ///
    /// Everything allocated at or after `ptr` is discarded. Pointers
    /// outside the arena are ignored.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) {
        if let Some(offset) = self.region.offset_of(ptr) {
            self.deallocate_to(offset);
        }
    }

    /// Discard every allocation, keeping committed pages for reuse.
    ///
    /// Open [`ArenaLevel`](crate::ArenaLevel)s become stale.
    pub fn clear(&mut self) {
        debug!(allocated = self.allocated, committed = self.committed(), "arena cleared");
        self.allocated = 0;
        self.top = None;
        self.depth = 0;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Release the reservation back to the provider.
    ///
    /// Equivalent to dropping the arena.
    pub fn free(self) {
        drop(self);
    }

    /// Bytes currently handed out.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Bytes currently committed.
    pub fn committed(&self) -> usize {
        self.region.committed()
    }

    /// Bytes of address space reserved.
    pub fn reserved(&self) -> usize {
        self.region.size()
    }

    /// Bytes that can still be allocated before exhaustion.
    pub fn remaining(&self) -> usize {
        self.region.size().saturating_sub(self.allocated)
    }

    /// Base address of the reservation.
    pub fn base(&self) -> NonNull<u8> {
        self.region.base()
    }

    /// Whether `ptr` lies inside the currently allocated range.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.region
            .offset_of(ptr)
            .is_some_and(|offset| offset < self.allocated)
    }

    /// Whether `ptr` is the start of the most recent allocation.
    pub fn is_top(&self, ptr: NonNull<u8>) -> bool {
        self.top.is_some() && self.region.offset_of(ptr) == self.top
    }

    /// Offset of a block start that may be resized.
    ///
    /// The top block is accepted even when it is zero-sized.
    fn live_offset(&self, ptr: NonNull<u8>) -> Result<usize, AllocError> {
        let offset = self.region.offset_of(ptr).ok_or(AllocError::ForeignPointer)?;
        if offset >= self.allocated && self.top != Some(offset) {
            return Err(AllocError::ForeignPointer);
        }
        if !is_aligned(offset, ALIGNMENT) {
            return Err(AllocError::Misaligned);
        }
        Ok(offset)
    }

    /// Move the end of the block starting at `offset` (the top block) so
    /// that it holds `size` bytes.
    pub(crate) fn resize_top(&mut self, offset: usize, size: usize) -> Result<(), AllocError> {
        debug_assert_eq!(self.top, Some(offset));
        let size = align_up(size, ALIGNMENT).ok_or(AllocError::SizeOverflow)?;
        let end = offset.checked_add(size).ok_or(AllocError::SizeOverflow)?;
        if end > self.allocated {
            if end > self.region.size() {
                return Err(AllocError::Exhausted {
                    requested: end - self.allocated,
                    available: self.region.size() - self.allocated,
                });
            }
            self.region.ensure_committed(end)?;
        }
        self.allocated = end;
        Ok(())
    }
}

impl<V: VirtualMemory> fmt::Debug for Arena<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.region.base())
            .field("reserved", &self.reserved())
            .field("committed", &self.committed())
            .field("allocated", &self.allocated)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> Arena {
        Arena::with_capacity(64 * 1024).unwrap()
    }

    #[test]
    fn new_arena_commits_nothing() {
        let arena = small_arena();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.committed(), 0);
        assert_eq!(arena.reserved(), 64 * 1024);
    }

    #[test]
    fn sizes_round_to_alignment() {
        let mut arena = small_arena();
        arena.allocate(1).unwrap();
        assert_eq!(arena.allocated(), 16);
        arena.allocate(17).unwrap();
        assert_eq!(arena.allocated(), 48);
    }

    #[test]
    fn allocations_are_sequential_and_aligned() {
        let mut arena = small_arena();
        let a = arena.allocate(10).unwrap();
        let b = arena.allocate(100).unwrap();
        assert_eq!(a, arena.base());
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 16);
        assert_eq!(b.as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn commit_follows_allocation() {
        let mut arena = small_arena();
        arena.allocate(100).unwrap();
        let first = arena.committed();
        assert!(first >= 8 * 1024);
        arena.allocate(first).unwrap();
        assert!(arena.committed() > first);
        assert!(arena.committed() >= arena.allocated());
    }

    #[test]
    fn allocation_exactly_filling_reservation_succeeds() {
        let mut arena = small_arena();
        arena.allocate(64 * 1024).unwrap();
        assert_eq!(arena.remaining(), 0);
        assert_eq!(arena.committed(), 64 * 1024);
    }

    #[test]
    fn exhaustion_leaves_arena_unchanged() {
        let mut arena = small_arena();
        arena.allocate(64 * 1024 - 16).unwrap();
        let result = arena.allocate(32);
        assert!(matches!(result, Err(AllocError::Exhausted { available: 16, .. })));
        assert_eq!(arena.allocated(), 64 * 1024 - 16);
        assert!(arena.allocate(16).is_ok());
    }

    #[test]
    fn oversized_request_reports_overflow_not_panic() {
        let mut arena = small_arena();
        assert_eq!(arena.allocate(usize::MAX), Err(AllocError::SizeOverflow));
    }

    #[test]
    fn allocate_zeroed_clears_reused_memory() {
        let mut arena = small_arena();
        let p = arena.allocate(64).unwrap();
        unsafe { ptr::write_bytes(p.as_ptr(), 0xFF, 64) };
        arena.clear();
        let q = arena.allocate_zeroed(64).unwrap();
        assert_eq!(p, q);
        let bytes = unsafe { std::slice::from_raw_parts(q.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn top_block_grows_in_place() {
        let mut arena = small_arena();
        arena.allocate(32).unwrap();
        let p = arena.allocate(32).unwrap();
        let q = arena.reallocate(p, 256).unwrap();
        assert_eq!(p, q);
        assert_eq!(arena.allocated(), 32 + 256);
    }

    #[test]
    fn top_block_shrinks_by_exact_delta() {
        let mut arena = small_arena();
        let p = arena.allocate(256).unwrap();
        let before = arena.allocated();
        let q = arena.reallocate(p, 64).unwrap();
        assert_eq!(p, q);
        assert_eq!(before - arena.allocated(), 192);
    }

    #[test]
    fn top_block_growth_past_reservation_fails() {
        let mut arena = small_arena();
        let p = arena.allocate(64).unwrap();
        let result = arena.reallocate(p, 128 * 1024);
        assert!(matches!(result, Err(AllocError::Exhausted { .. })));
        assert_eq!(arena.allocated(), 64);
    }

    #[test]
    fn older_block_is_relocated_with_contents() {
        let mut arena = small_arena();
        let old = arena.allocate(16).unwrap();
        unsafe { ptr::copy_nonoverlapping(b"0123456789abcdef".as_ptr(), old.as_ptr(), 16) };
        let later = arena.allocate(16).unwrap();
        let moved = arena.reallocate(old, 64).unwrap();
        assert_ne!(moved, old);
        assert!(moved.as_ptr() > later.as_ptr());
        let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), 16) };
        assert_eq!(bytes, b"0123456789abcdef");
    }

    #[test]
    fn reallocate_rejects_foreign_and_misaligned_pointers() {
        let mut arena = small_arena();
        let p = arena.allocate(64).unwrap();
        let outside = NonNull::from(&0u8);
        assert_eq!(arena.reallocate(outside, 8), Err(AllocError::ForeignPointer));
        let interior = unsafe { NonNull::new_unchecked(p.as_ptr().add(3)) };
        assert_eq!(arena.reallocate(interior, 8), Err(AllocError::Misaligned));
        let past_end = unsafe { NonNull::new_unchecked(p.as_ptr().add(64)) };
        assert_eq!(arena.reallocate(past_end, 8), Err(AllocError::ForeignPointer));
    }

    #[test]
    fn deallocate_forward_is_ignored() {
        let mut arena = small_arena();
        arena.allocate(64).unwrap();
        arena.deallocate_to(128);
        assert_eq!(arena.allocated(), 64);
        arena.deallocate_to(64);
        assert_eq!(arena.allocated(), 64);
    }

    #[test]
    fn deallocate_variants_agree() {
        let mut arena = small_arena();
        arena.allocate(32).unwrap();
        let p = arena.allocate(32).unwrap();
        arena.allocate(32).unwrap();

        let mut by_size = small_arena();
        by_size.allocate(96).unwrap();
        by_size.deallocate_size(64);

        arena.deallocate(p);
        assert_eq!(arena.allocated(), 32);
        assert_eq!(by_size.allocated(), 32);

        arena.deallocate_size(1000);
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn deallocate_ignores_foreign_pointer() {
        let mut arena = small_arena();
        arena.allocate(32).unwrap();
        arena.deallocate(NonNull::from(&0u8));
        assert_eq!(arena.allocated(), 32);
    }

    #[test]
    fn truncating_the_top_block_forgets_it() {
        let mut arena = small_arena();
        let a = arena.allocate(32).unwrap();
        let b = arena.allocate(32).unwrap();
        assert!(arena.is_top(b));
        arena.deallocate(b);
        assert!(!arena.is_top(b));
        assert!(!arena.is_top(a));
    }

    #[test]
    fn clear_keeps_commit() {
        let mut arena = small_arena();
        arena.allocate(20_000).unwrap();
        let committed = arena.committed();
        arena.clear();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.committed(), committed);
    }

    #[test]
    fn contains_tracks_allocated_range() {
        let mut arena = small_arena();
        let p = arena.allocate(16).unwrap();
        assert!(arena.contains(p));
        arena.clear();
        assert!(!arena.contains(p));
    }

    #[test]
    fn zero_sized_allocation_is_top_and_resizable() {
        let mut arena = small_arena();
        let p = arena.allocate(0).unwrap();
        assert_eq!(arena.allocated(), 0);
        let q = arena.reallocate(p, 32).unwrap();
        assert_eq!(p, q);
        assert_eq!(arena.allocated(), 32);
    }

    #[test]
    fn default_reservation_is_one_gib() {
        let arena = Arena::new(ArenaConfig::default()).unwrap();
        assert_eq!(arena.reserved(), 1 << 30);
        assert_eq!(arena.committed(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bump_is_monotonic_and_non_overlapping(
                sizes in proptest::collection::vec(0usize..5000, 1..64),
            ) {
                let mut arena = Arena::with_capacity(1 << 20).unwrap();
                let mut expected = 0usize;
                let mut last_end = arena.base().as_ptr() as usize;
                for size in sizes {
                    let p = arena.allocate(size).unwrap().as_ptr() as usize;
                    prop_assert!(p >= last_end);
                    prop_assert_eq!(p % ALIGNMENT, 0);
                    let aligned = align_up(size, ALIGNMENT).unwrap();
                    expected += aligned;
                    last_end = p + aligned;
                    prop_assert_eq!(arena.allocated(), expected);
                    prop_assert!(arena.allocated() <= arena.committed());
                    prop_assert!(arena.committed() <= arena.reserved());
                }
            }

            #[test]
            fn shrink_then_grow_top_returns_same_pointer(
                first in 1usize..4096,
                second in 1usize..4096,
            ) {
                let mut arena = Arena::with_capacity(1 << 20).unwrap();
                let p = arena.allocate(first).unwrap();
                let q = arena.reallocate(p, second).unwrap();
                prop_assert_eq!(p, q);
                prop_assert_eq!(arena.allocated(), align_up(second, ALIGNMENT).unwrap());
            }
        }
    }
}
