//! The [`VirtualMemory`] boundary and its OS-backed implementation.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::error::VmError;
use crate::sys;

/// A source of reservable, committable address space.
///
/// Implementations hand out a stable base address for the full reserved
/// range without backing it. Callers commit sub-ranges before touching
/// them and release the whole range exactly once.
pub trait VirtualMemory {
    /// Granularity of commit/decommit in bytes. Always a power of two.
    fn page_size(&self) -> usize;

    /// Reserve `size` bytes of address space with no physical backing.
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, VmError>;

    /// Make `[base, base + size)` readable and writable.
    ///
    /// # Safety
    ///
    /// The range must lie inside a reservation obtained from this provider
    /// that has not been released.
    unsafe fn commit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Drop the backing of `[base, base + size)` and revoke access.
    ///
    /// # Safety
    ///
    /// Same range requirements as [`commit`](Self::commit). No live
    /// references into the range may exist.
    unsafe fn decommit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Return a whole reservation to the provider.
    ///
    /// # Safety
    ///
    /// `base` and `size` must be exactly the values of one earlier
    /// successful [`reserve`](Self::reserve) call, released only once.
    unsafe fn release(&self, base: NonNull<u8>, size: usize);
}

impl<V: VirtualMemory + ?Sized> VirtualMemory for &V {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn reserve(&self, size: usize) -> Result<NonNull<u8>, VmError> {
        (**self).reserve(size)
    }

    unsafe fn commit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).commit(base, size) }
    }

    unsafe fn decommit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).decommit(base, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).release(base, size) }
    }
}

/// Virtual memory from the operating system.
///
/// On unix this maps `PROT_NONE` anonymous memory and flips protection on
/// commit. Elsewhere the reservation is an eagerly allocated, zeroed block
/// and commit/decommit are no-ops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemVm;

impl SystemVm {
    /// Create a provider handle. Zero-sized; all state lives in the OS.
    pub const fn new() -> Self {
        SystemVm
    }
}

impl VirtualMemory for SystemVm {
    fn page_size(&self) -> usize {
        sys::page_size()
    }

    fn reserve(&self, size: usize) -> Result<NonNull<u8>, VmError> {
        if size == 0 {
            return Err(VmError::ZeroSize);
        }
        let base = sys::reserve(size)?;
        debug!(size, base = ?base, "reserved address space");
        Ok(base)
    }

    unsafe fn commit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        trace!(size, base = ?base, "commit");
        // SAFETY: caller guarantees the range is inside a live reservation.
        unsafe { sys::commit(base, size) }
    }

    unsafe fn decommit(&self, base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        trace!(size, base = ?base, "decommit");
        // SAFETY: caller guarantees the range is inside a live reservation.
        unsafe { sys::decommit(base, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) {
        debug!(size, base = ?base, "released address space");
        // SAFETY: caller passes back exactly one earlier reservation.
        unsafe { sys::release(base, size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let page = SystemVm.page_size();
        assert!(page.is_power_of_two());
        assert!(page >= 4096);
    }

    #[test]
    fn zero_reservation_is_rejected() {
        assert_eq!(SystemVm.reserve(0), Err(VmError::ZeroSize));
    }

    #[test]
    fn committed_pages_are_zeroed_and_writable() {
        let vm = SystemVm::new();
        let page = vm.page_size();
        let size = page * 4;
        let base = vm.reserve(size).unwrap();
        unsafe {
            vm.commit(base, page * 2).unwrap();
            let bytes = std::slice::from_raw_parts_mut(base.as_ptr(), page * 2);
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[0] = 0xAB;
            bytes[page * 2 - 1] = 0xCD;
            assert_eq!(bytes[0], 0xAB);
            assert_eq!(bytes[page * 2 - 1], 0xCD);
            vm.release(base, size);
        }
    }

    #[test]
    fn decommit_then_recommit_succeeds() {
        let vm = SystemVm::new();
        let page = vm.page_size();
        let base = vm.reserve(page).unwrap();
        unsafe {
            vm.commit(base, page).unwrap();
            base.as_ptr().write(7);
            vm.decommit(base, page).unwrap();
            vm.commit(base, page).unwrap();
            // Backing may or may not have been dropped; the page is usable either way.
            base.as_ptr().write(9);
            assert_eq!(base.as_ptr().read(), 9);
            vm.release(base, page);
        }
    }

    #[cfg(unix)]
    #[test]
    fn decommit_reports_os_refusal() {
        let vm = SystemVm::new();
        let page = vm.page_size();
        let base = vm.reserve(page * 2).unwrap();
        unsafe {
            vm.commit(base, page * 2).unwrap();
            let unaligned = NonNull::new_unchecked(base.as_ptr().add(1));
            let err = vm.decommit(unaligned, page).unwrap_err();
            assert!(matches!(err, VmError::DecommitFailed { size, errno } if size == page && errno != 0));
            base.as_ptr().add(page).write(3);
            assert_eq!(base.as_ptr().add(page).read(), 3);
            vm.release(base, page * 2);
        }
    }

    #[test]
    fn reference_forwards_to_provider() {
        let vm = SystemVm::new();
        let by_ref = &vm;
        assert_eq!(by_ref.page_size(), vm.page_size());
    }
}
