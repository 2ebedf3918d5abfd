//! Platform back-ends for [`SystemVm`](crate::SystemVm).

#![allow(unsafe_code)]

#[cfg(unix)]
pub(crate) use unix::{commit, decommit, page_size, release, reserve};

#[cfg(not(unix))]
pub(crate) use fallback::{commit, decommit, page_size, release, reserve};

/// Page size assumed when the OS query fails.
const FALLBACK_PAGE_SIZE: usize = 4096;

#[cfg(unix)]
mod unix {
    use std::ptr::{self, NonNull};

    use super::FALLBACK_PAGE_SIZE;
    use crate::error::VmError;

    fn last_errno() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }

    pub(crate) fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && (size as usize).is_power_of_two() {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    }

    pub(crate) fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
        // SAFETY: anonymous private mapping with no address hint.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(VmError::ReserveFailed {
                size,
                errno: last_errno(),
            });
        }
        NonNull::new(ptr.cast()).ok_or(VmError::ReserveFailed { size, errno: 0 })
    }

    /// # Safety
    ///
    /// `[base, base + size)` must lie inside a live mapping from [`reserve`].
    pub(crate) unsafe fn commit(base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: range is inside our own mapping per caller contract.
        let rc = unsafe {
            libc::mprotect(
                base.as_ptr().cast(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return Err(VmError::CommitFailed {
                size,
                errno: last_errno(),
            });
        }
        Ok(())
    }

    /// # Safety
    ///
    /// Same as [`commit`]; no references into the range may be live.
    pub(crate) unsafe fn decommit(base: NonNull<u8>, size: usize) -> Result<(), VmError> {
        // SAFETY: range is inside our own mapping per caller contract.
        let advised = unsafe { libc::madvise(base.as_ptr().cast(), size, libc::MADV_DONTNEED) };
        if advised != 0 {
            return Err(VmError::DecommitFailed {
                size,
                errno: last_errno(),
            });
        }
        // SAFETY: as above.
        let rc = unsafe { libc::mprotect(base.as_ptr().cast(), size, libc::PROT_NONE) };
        if rc != 0 {
            return Err(VmError::DecommitFailed {
                size,
                errno: last_errno(),
            });
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `base`/`size` must describe exactly one mapping from [`reserve`].
    pub(crate) unsafe fn release(base: NonNull<u8>, size: usize) {
        // SAFETY: caller passes back one whole mapping.
        unsafe {
            libc::munmap(base.as_ptr().cast(), size);
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use std::alloc::{self, Layout};
    use std::ptr::NonNull;

    use super::FALLBACK_PAGE_SIZE;
    use crate::error::VmError;

    pub(crate) fn page_size() -> usize {
        FALLBACK_PAGE_SIZE
    }

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, FALLBACK_PAGE_SIZE).ok()
    }

    pub(crate) fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
        let layout = layout(size).ok_or(VmError::ReserveFailed { size, errno: 0 })?;
        // SAFETY: layout has non-zero size (checked by the provider).
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(VmError::ReserveFailed { size, errno: 0 })
    }

    pub(crate) unsafe fn commit(_base: NonNull<u8>, _size: usize) -> Result<(), VmError> {
        Ok(())
    }

    pub(crate) unsafe fn decommit(_base: NonNull<u8>, _size: usize) -> Result<(), VmError> {
        Ok(())
    }

    pub(crate) unsafe fn release(base: NonNull<u8>, size: usize) {
        if let Some(layout) = layout(size) {
            // SAFETY: allocated in `reserve` with the same layout.
            unsafe { alloc::dealloc(base.as_ptr(), layout) }
        }
    }
}
