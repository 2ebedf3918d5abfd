//! Growable array over a [`Mem`].

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use bedrock_alloc::mem::check_alignment;
use bedrock_alloc::{AllocError, Mem};

/// Smallest non-zero capacity.
const MIN_CAPACITY: usize = 4;

/// A contiguous growable array whose buffer comes from a [`Mem`].
///
/// Behaves like `Vec<T>` except that every operation that may allocate
/// returns a `Result` instead of aborting. Element access goes through the
/// slice API (`get`, `iter`, indexing) via `Deref`.
///
/// Element types aligned beyond the allocator's guarantee are rejected at
/// the first allocation with [`AllocError::UnsupportedAlignment`].
pub struct MemVec<'m, T> {
    mem: &'m dyn Mem,
    /// Dangling while nothing is allocated.
    ptr: NonNull<T>,
    cap: usize,
    len: usize,
    _owns: PhantomData<T>,
}

impl<'m, T> MemVec<'m, T> {
    /// Create an empty vector. Nothing is allocated until the first push.
    pub fn new(mem: &'m dyn Mem) -> Self {
        Self {
            mem,
            ptr: NonNull::dangling(),
            cap: if size_of::<T>() == 0 { usize::MAX } else { 0 },
            len: 0,
            _owns: PhantomData,
        }
    }

    /// Create an empty vector with room for at least `capacity` elements.
    pub fn with_capacity(mem: &'m dyn Mem, capacity: usize) -> Result<Self, AllocError> {
        let mut vec = Self::new(mem);
        vec.reserve(capacity)?;
        Ok(vec)
    }

    /// The allocator backing this vector.
    pub fn mem(&self) -> &'m dyn Mem {
        self.mem
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Make room for at least `additional` more elements.
    ///
    /// Capacity at least doubles on growth. Fails with
    /// [`AllocError::SizeOverflow`] if the buffer size would overflow.
    pub fn reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::SizeOverflow)?;
        if required <= self.cap {
            return Ok(());
        }
        let target = required
            .max(self.cap.saturating_mul(2))
            .max(MIN_CAPACITY);
        self.grow_to(target)
    }

    fn grow_to(&mut self, capacity: usize) -> Result<(), AllocError> {
        check_alignment::<T>(self.mem.alignment())?;
        let bytes = capacity
            .checked_mul(size_of::<T>())
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(AllocError::SizeOverflow)?;
        let old = (self.cap > 0).then(|| self.ptr.cast::<u8>());
        // SAFETY: `old` is our own live buffer from `self.mem`.
        let fresh = unsafe { self.mem.reallocate(old, bytes)? };
        self.ptr = fresh.cast();
        self.cap = capacity;
        Ok(())
    }

    /// Append an element.
    pub fn push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len == self.cap {
            self.reserve(1)?;
        }
        // SAFETY: len < cap after reserve.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old last index is initialized and now
        // outside `len`, so it is read exactly once.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    /// Insert `value` at `index`, shifting later elements right.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), AllocError> {
        if index > self.len {
            return Err(AllocError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        self.reserve(1)?;
        // SAFETY: index <= len < cap; the shifted range stays in the buffer.
        unsafe {
            let at = self.ptr.as_ptr().add(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Remove and return the element at `index`, shifting later elements
    /// left.
    pub fn remove(&mut self, index: usize) -> Result<T, AllocError> {
        if index >= self.len {
            return Err(AllocError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len; the element is moved out before the tail is
        // shifted over it.
        let value = unsafe {
            let at = self.ptr.as_ptr().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, self.len - index - 1);
            value
        };
        self.len -= 1;
        Ok(value)
    }

    /// Remove the element at `index`, replacing it with the last one.
    pub fn swap_remove(&mut self, index: usize) -> Result<T, AllocError> {
        if index >= self.len {
            return Err(AllocError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let last = self.len - 1;
        self.as_mut_slice().swap(index, last);
        self.pop().ok_or(AllocError::IndexOutOfBounds {
            index,
            len: self.len,
        })
    }

    /// Drop every element past `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = ptr::slice_from_raw_parts_mut(
            // SAFETY: len < self.len, inside the buffer.
            unsafe { self.ptr.as_ptr().add(len) },
            self.len - len,
        );
        self.len = len;
        // SAFETY: the tail elements are initialized and no longer reachable.
        unsafe { ptr::drop_in_place(tail) };
    }

    /// Drop every element, keeping the buffer.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Resize to `new_len`, filling new slots with clones of `value`.
    pub fn resize(&mut self, new_len: usize, value: T) -> Result<(), AllocError>
    where
        T: Clone,
    {
        if new_len <= self.len {
            self.truncate(new_len);
            return Ok(());
        }
        self.reserve(new_len - self.len)?;
        while self.len < new_len {
            // SAFETY: len < new_len <= cap.
            unsafe { self.ptr.as_ptr().add(self.len).write(value.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    /// The elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` elements are initialized; the pointer is
        // aligned and non-null even when dangling.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, with unique access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for MemVec<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if size_of::<T>() != 0 && self.cap > 0 {
            // SAFETY: the buffer came from `self.mem` and is released once.
            unsafe { self.mem.deallocate(self.ptr.cast()) };
        }
    }
}

impl<T> Deref for MemVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for MemVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T> IntoIterator for &'a MemVec<'_, T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut MemVec<'_, T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for MemVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
