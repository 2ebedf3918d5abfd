//! Reference-counted boxes whose storage comes from a [`Mem`].
//!
//! [`MemRc`] keeps a plain counter and is confined to one thread.
//! [`MemArc`] guards its counter with a `Mutex` stored beside the value and
//! may be shared across threads when both the value and the allocator are
//! `Sync`. In both, the last handle to drop runs the value's destructor and
//! returns the block to the allocator.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, PoisonError};

use bedrock_alloc::mem::check_alignment;
use bedrock_alloc::{AllocError, Mem};

struct RcBox<T> {
    count: Cell<usize>,
    value: T,
}

/// Single-threaded counted box over a [`Mem`].
///
/// ```
/// use bedrock_alloc::SystemMem;
/// use bedrock_ds::MemRc;
///
/// let mem = SystemMem::new();
/// let a = MemRc::new(&mem, String::from("shared")).unwrap();
/// let b = a.clone();
/// assert_eq!(MemRc::strong_count(&a), 2);
/// drop(a);
/// assert_eq!(*b, "shared");
/// ```
pub struct MemRc<'m, T> {
    mem: &'m dyn Mem,
    ptr: NonNull<RcBox<T>>,
    _owns: PhantomData<RcBox<T>>,
}

impl<'m, T> MemRc<'m, T> {
    /// Move `value` into a zeroed block from `mem` with a count of one.
    pub fn new(mem: &'m dyn Mem, value: T) -> Result<Self, AllocError> {
        check_alignment::<RcBox<T>>(mem.alignment())?;
        let raw = mem.allocate_zeroed(size_of::<RcBox<T>>())?;
        let ptr = raw.cast::<RcBox<T>>();
        // SAFETY: fresh block, sized and aligned for `RcBox<T>`.
        unsafe {
            ptr.as_ptr().write(RcBox {
                count: Cell::new(1),
                value,
            })
        };
        Ok(Self {
            mem,
            ptr,
            _owns: PhantomData,
        })
    }

    /// Number of live handles to this value.
    pub fn strong_count(this: &Self) -> usize {
        this.inner().count.get()
    }

    /// `true` if both handles point at the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Mutable access when `this` is the only handle.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.inner().count.get() != 1 {
            return None;
        }
        // SAFETY: no other handle exists, and `this` is borrowed mutably.
        Some(unsafe { &mut (*this.ptr.as_ptr()).value })
    }

    fn inner(&self) -> &RcBox<T> {
        // SAFETY: the box lives until the last handle drops.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Clone for MemRc<'_, T> {
    fn clone(&self) -> Self {
        let count = &self.inner().count;
        match count.get().checked_add(1) {
            Some(next) => count.set(next),
            None => std::process::abort(),
        }
        Self {
            mem: self.mem,
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for MemRc<'_, T> {
    fn drop(&mut self) {
        let count = &self.inner().count;
        let left = count.get() - 1;
        count.set(left);
        if left == 0 {
            // SAFETY: this was the last handle; the block came from
            // `self.mem` and is not touched again.
            unsafe {
                ptr::drop_in_place(self.ptr.as_ptr());
                self.mem.deallocate(self.ptr.cast());
            }
        }
    }
}

impl<T> Deref for MemRc<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T: fmt::Debug> fmt::Debug for MemRc<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

struct ArcBox<T> {
    count: Mutex<usize>,
    value: T,
}

/// Thread-safe counted box over a [`Mem`].
///
/// The allocator is held by reference, so `M` must be `Sync` for handles
/// to cross threads.
pub struct MemArc<'m, T, M: Mem + ?Sized> {
    mem: &'m M,
    ptr: NonNull<ArcBox<T>>,
    _owns: PhantomData<ArcBox<T>>,
}

// SAFETY: the count is only touched under its mutex. The value may be
// dropped by whichever thread releases last, and the allocator is reached
// through a shared `&M`.
unsafe impl<T: Send + Sync, M: Mem + Sync + ?Sized> Send for MemArc<'_, T, M> {}
// SAFETY: as above.
unsafe impl<T: Send + Sync, M: Mem + Sync + ?Sized> Sync for MemArc<'_, T, M> {}

impl<'m, T, M: Mem + ?Sized> MemArc<'m, T, M> {
    /// Move `value` into a zeroed block from `mem` with a count of one.
    pub fn new(mem: &'m M, value: T) -> Result<Self, AllocError> {
        check_alignment::<ArcBox<T>>(mem.alignment())?;
        let raw = mem.allocate_zeroed(size_of::<ArcBox<T>>())?;
        let ptr = raw.cast::<ArcBox<T>>();
        // SAFETY: fresh block, sized and aligned for `ArcBox<T>`.
        unsafe {
            ptr.as_ptr().write(ArcBox {
                count: Mutex::new(1),
                value,
            })
        };
        Ok(Self {
            mem,
            ptr,
            _owns: PhantomData,
        })
    }

    /// Number of live handles to this value.
    pub fn strong_count(this: &Self) -> usize {
        *this.count_guard()
    }

    /// `true` if both handles point at the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    fn inner(&self) -> &ArcBox<T> {
        // SAFETY: the box lives until the last handle drops.
        unsafe { self.ptr.as_ref() }
    }

    fn count_guard(&self) -> std::sync::MutexGuard<'_, usize> {
        self.inner()
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, M: Mem + ?Sized> Clone for MemArc<'_, T, M> {
    fn clone(&self) -> Self {
        {
            let mut count = self.count_guard();
            match count.checked_add(1) {
                Some(next) => *count = next,
                None => std::process::abort(),
            }
        }
        Self {
            mem: self.mem,
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }
}

impl<T, M: Mem + ?Sized> Drop for MemArc<'_, T, M> {
    fn drop(&mut self) {
        let last = {
            let mut count = self.count_guard();
            *count -= 1;
            *count == 0
        };
        if last {
            // SAFETY: the count reached zero under the lock, so no other
            // handle exists; the block came from `self.mem`.
            unsafe {
                ptr::drop_in_place(self.ptr.as_ptr());
                self.mem.deallocate(self.ptr.cast());
            }
        }
    }
}

impl<T, M: Mem + ?Sized> Deref for MemArc<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T: fmt::Debug, M: Mem + ?Sized> fmt::Debug for MemArc<'_, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
