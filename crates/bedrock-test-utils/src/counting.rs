//! A [`Mem`] wrapper that keeps a ledger of live blocks.

#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use bedrock_alloc::{AllocError, Mem, SystemMem};
use indexmap::IndexMap;

/// Forwards to an inner [`Mem`] and records every block.
///
/// Live blocks are kept in allocation order. Deallocating a pointer the
/// ledger does not know is counted in [`unmatched`](Self::unmatched) and
/// is *not* forwarded, so tests can probe misuse without corrupting the
/// inner allocator.
pub struct CountingMem<M: Mem = SystemMem> {
    inner: M,
    allocations: Cell<usize>,
    reallocations: Cell<usize>,
    deallocations: Cell<usize>,
    failures: Cell<usize>,
    unmatched: Cell<usize>,
    live: RefCell<IndexMap<usize, usize>>,
}

impl CountingMem<SystemMem> {
    /// Count allocations served by the process allocator.
    pub fn system() -> Self {
        Self::new(SystemMem::new())
    }
}

impl Default for CountingMem<SystemMem> {
    fn default() -> Self {
        Self::system()
    }
}

impl<M: Mem> CountingMem<M> {
    /// Wrap `inner` with an empty ledger.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            allocations: Cell::new(0),
            reallocations: Cell::new(0),
            deallocations: Cell::new(0),
            failures: Cell::new(0),
            unmatched: Cell::new(0),
            live: RefCell::new(IndexMap::new()),
        }
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Successful `allocate` calls (including `reallocate(None, _)`).
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Successful `reallocate` calls on an existing block.
    pub fn reallocations(&self) -> usize {
        self.reallocations.get()
    }

    /// Matched `deallocate` calls.
    pub fn deallocations(&self) -> usize {
        self.deallocations.get()
    }

    /// Calls that the inner allocator rejected.
    pub fn failures(&self) -> usize {
        self.failures.get()
    }

    /// `deallocate` calls with a pointer that was not live.
    pub fn unmatched(&self) -> usize {
        self.unmatched.get()
    }

    /// Number of blocks allocated and not yet deallocated.
    pub fn live_blocks(&self) -> usize {
        self.live.borrow().len()
    }

    /// Sum of the requested sizes of all live blocks.
    pub fn live_bytes(&self) -> usize {
        self.live.borrow().values().sum()
    }

    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.live.borrow().contains_key(&(ptr.as_ptr() as usize))
    }

    /// Requested size of a live block.
    pub fn size_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.live.borrow().get(&(ptr.as_ptr() as usize)).copied()
    }

    /// Live blocks in the order they were allocated.
    pub fn live_pointers(&self) -> Vec<NonNull<u8>> {
        self.live
            .borrow()
            .keys()
            .filter_map(|&addr| NonNull::new(addr as *mut u8))
            .collect()
    }

    /// Whether every block handed out has come back exactly once.
    pub fn is_balanced(&self) -> bool {
        self.live_blocks() == 0 && self.unmatched() == 0
    }

    fn record<T>(&self, result: &Result<T, AllocError>) {
        if result.is_err() {
            self.failures.set(self.failures.get() + 1);
        }
    }
}

impl<M: Mem> Mem for CountingMem<M> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let result = self.inner.allocate(size);
        self.record(&result);
        if let Ok(ptr) = result {
            self.allocations.set(self.allocations.get() + 1);
            self.live.borrow_mut().insert(ptr.as_ptr() as usize, size);
        }
        result
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(old) = ptr else {
            return self.allocate(size);
        };
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.reallocate(Some(old), size) };
        self.record(&result);
        if let Ok(fresh) = result {
            self.reallocations.set(self.reallocations.get() + 1);
            let mut live = self.live.borrow_mut();
            live.shift_remove(&(old.as_ptr() as usize));
            live.insert(fresh.as_ptr() as usize, size);
        }
        result
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let removed = self.live.borrow_mut().shift_remove(&(ptr.as_ptr() as usize));
        if removed.is_none() {
            self.unmatched.set(self.unmatched.get() + 1);
            return;
        }
        self.deallocations.set(self.deallocations.get() + 1);
        // SAFETY: the ledger shows the block is live in `inner`.
        unsafe { self.inner.deallocate(ptr) };
    }

    fn alignment(&self) -> usize {
        self.inner.alignment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_tracks_pairs() {
        let mem = CountingMem::system();
        let a = mem.allocate(10).unwrap();
        let b = mem.allocate(20).unwrap();
        assert_eq!(mem.live_blocks(), 2);
        assert_eq!(mem.live_bytes(), 30);
        assert_eq!(mem.live_pointers(), vec![a, b]);
        unsafe {
            mem.deallocate(a);
            mem.deallocate(b);
        }
        assert!(mem.is_balanced());
        assert_eq!(mem.deallocations(), 2);
    }

    #[test]
    fn unknown_pointer_is_counted_not_forwarded() {
        let mem = CountingMem::system();
        let a = mem.allocate(10).unwrap();
        unsafe {
            mem.deallocate(a);
            mem.deallocate(a);
        }
        assert_eq!(mem.unmatched(), 1);
        assert!(!mem.is_balanced());
    }

    #[test]
    fn reallocate_moves_ledger_entry() {
        let mem = CountingMem::system();
        let a = mem.allocate(8).unwrap();
        let b = unsafe { mem.reallocate(Some(a), 4096) }.unwrap();
        assert_eq!(mem.size_of(b), Some(4096));
        assert_eq!(mem.live_blocks(), 1);
        unsafe { mem.deallocate(b) };
        assert!(mem.is_balanced());
    }
}
