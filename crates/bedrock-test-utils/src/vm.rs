//! Instrumented [`VirtualMemory`] providers.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::ptr::NonNull;

use bedrock_vm::{SystemVm, VirtualMemory, VmError};

/// Forwards to an inner provider and counts every call.
#[derive(Debug, Default)]
pub struct CountingVm<V: VirtualMemory = SystemVm> {
    inner: V,
    reserves: Cell<usize>,
    commits: Cell<usize>,
    committed_bytes: Cell<usize>,
    decommits: Cell<usize>,
    releases: Cell<usize>,
}

impl<V: VirtualMemory> CountingVm<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            reserves: Cell::new(0),
            commits: Cell::new(0),
            committed_bytes: Cell::new(0),
            decommits: Cell::new(0),
            releases: Cell::new(0),
        }
    }

    pub fn reserves(&self) -> usize {
        self.reserves.get()
    }

    /// Number of successful commit calls.
    pub fn commits(&self) -> usize {
        self.commits.get()
    }

    /// Total bytes passed to successful commit calls.
    pub fn committed_bytes(&self) -> usize {
        self.committed_bytes.get()
    }

    pub fn decommits(&self) -> usize {
        self.decommits.get()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }
}

impl<V: VirtualMemory> VirtualMemory for CountingVm<V> {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn reserve(&self, size: usize) -> Result<NonNull<u8>, VmError> {
        let base = self.inner.reserve(size)?;
        self.reserves.set(self.reserves.get() + 1);
        Ok(base)
    }

    unsafe fn commit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.commit(base, size)? };
        self.commits.set(self.commits.get() + 1);
        self.committed_bytes.set(self.committed_bytes.get() + size);
        Ok(())
    }

    unsafe fn decommit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        self.decommits.set(self.decommits.get() + 1);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.decommit(base, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) {
        self.releases.set(self.releases.get() + 1);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(base, size) }
    }
}

/// Provider that refuses to commit more than `budget` bytes in total.
///
/// Refused commits fail with [`VmError::CommitFailed`] and `errno` 12
/// (`ENOMEM`), the way an overcommitted system would report it.
#[derive(Debug)]
pub struct LimitVm<V: VirtualMemory = SystemVm> {
    inner: V,
    budget: usize,
    used: Cell<usize>,
}

impl LimitVm<SystemVm> {
    pub fn system(budget: usize) -> Self {
        Self::new(SystemVm::new(), budget)
    }
}

impl<V: VirtualMemory> LimitVm<V> {
    pub fn new(inner: V, budget: usize) -> Self {
        Self {
            inner,
            budget,
            used: Cell::new(0),
        }
    }

    /// Bytes committed so far.
    pub fn used(&self) -> usize {
        self.used.get()
    }
}

impl<V: VirtualMemory> VirtualMemory for LimitVm<V> {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn reserve(&self, size: usize) -> Result<NonNull<u8>, VmError> {
        self.inner.reserve(size)
    }

    unsafe fn commit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        let total = self.used.get().saturating_add(size);
        if total > self.budget {
            return Err(VmError::CommitFailed { size, errno: 12 });
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.commit(base, size)? };
        self.used.set(total);
        Ok(())
    }

    unsafe fn decommit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.decommit(base, size)? };
        self.used.set(self.used.get().saturating_sub(size));
        Ok(())
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(base, size) }
    }
}
