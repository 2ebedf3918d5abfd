//! Pass-through to the process allocator.

#![allow(unsafe_code)]

use std::mem::size_of;
use std::ptr::NonNull;

use crate::error::AllocError;
use crate::mem::Mem;

/// [`Mem`] backed by the C library's `malloc`, `realloc` and `free`.
///
/// Stateless and safe to share between threads. Blocks are aligned to
/// `2 * size_of::<usize>()`, the guarantee `malloc` makes for fundamental
/// types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemMem;

impl SystemMem {
    /// Create the process allocator handle.
    pub const fn new() -> Self {
        SystemMem
    }
}

fn exhausted(size: usize) -> AllocError {
    AllocError::Exhausted {
        requested: size,
        available: 0,
    }
}

impl Mem for SystemMem {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        // SAFETY: malloc has no preconditions; zero is promoted so the
        // result is always a unique, freeable block.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr.cast()).ok_or_else(|| exhausted(size))
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(ptr) = ptr else {
            return self.allocate(size);
        };
        // SAFETY: caller guarantees `ptr` came from this allocator (malloc).
        // On failure realloc leaves the old block untouched.
        let fresh = libc::realloc(ptr.as_ptr().cast(), size.max(1));
        NonNull::new(fresh.cast()).ok_or_else(|| exhausted(size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` came from malloc/realloc.
        libc::free(ptr.as_ptr().cast());
    }

    fn alignment(&self) -> usize {
        2 * size_of::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemExt;
    use std::mem::align_of;

    #[test]
    fn allocate_write_free() {
        let mem = SystemMem::new();
        let p = mem.allocate(100).unwrap();
        assert_eq!(p.as_ptr() as usize % mem.alignment(), 0);
        unsafe {
            p.as_ptr().write_bytes(0x11, 100);
            mem.deallocate(p);
        }
    }

    #[test]
    fn zero_size_gives_unique_blocks() {
        let mem = SystemMem::new();
        let a = mem.allocate(0).unwrap();
        let b = mem.allocate(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            mem.deallocate(a);
            mem.deallocate(b);
        }
    }

    #[test]
    fn reallocate_preserves_prefix() {
        let mem = SystemMem::new();
        let p = mem.allocate(8).unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping(b"12345678".as_ptr(), p.as_ptr(), 8);
            let q = mem.reallocate(Some(p), 1 << 16).unwrap();
            assert_eq!(std::slice::from_raw_parts(q.as_ptr(), 8), b"12345678");
            mem.deallocate(q);
        }
    }

    #[test]
    fn array_helper_zeroes() {
        let mem = SystemMem::new();
        let p = mem.allocate_array::<u32>(64).unwrap();
        unsafe {
            assert!(std::slice::from_raw_parts(p.as_ptr(), 64).iter().all(|&x| x == 0));
            mem.deallocate(p.cast());
        }
    }

    #[test]
    fn alignment_follows_pointer_width() {
        let mem = SystemMem::new();
        let expected = if cfg!(target_pointer_width = "64") { 16 } else { 8 };
        assert_eq!(mem.alignment(), expected);
        for size in [1, 7, 24, 100, 4096] {
            let p = mem.allocate(size).unwrap();
            assert_eq!(p.as_ptr() as usize % expected, 0);
            unsafe { mem.deallocate(p) };
        }
        let wide = mem.allocate_array::<u128>(1).map(|p| p.cast::<u8>());
        if align_of::<u128>() > expected {
            assert!(matches!(wide, Err(AllocError::UnsupportedAlignment { .. })));
        } else {
            unsafe { mem.deallocate(wide.unwrap()) };
        }
    }

    #[test]
    fn shareable_between_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<SystemMem>();
    }
}
