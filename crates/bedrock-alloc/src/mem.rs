//! The generic allocator interface.
//!
//! [`Mem`] is the capability every container in the workspace is written
//! against. Backends:
//!
//! | Backend | Allocate | Reallocate | Deallocate |
//! |---------|----------|------------|------------|
//! | [`ArenaMem`] | bump, zero promoted to one unit | in place for the top block, else relocate | truncates the top block, else no-op |
//! | [`HeapMem`] | first fit | move + free | free + coalesce |
//! | [`SystemMem`](crate::SystemMem) | `malloc` | `realloc` | `free` |
//! | [`SmartMem`](crate::SmartMem) | parent + track | parent | parent + untrack |
//!
//! Every block is aligned to at least [`Mem::alignment`]: [`ALIGNMENT`] for
//! the arena, heap and smart backends, the platform `malloc` guarantee for
//! [`SystemMem`](crate::SystemMem).

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};

use bedrock_vm::VirtualMemory;

use crate::align::ALIGNMENT;
use crate::arena::Arena;
use crate::error::AllocError;
use crate::heap::Heap;

/// A source of raw memory blocks.
///
/// Implementations use interior mutability so that several containers can
/// share one allocator through `&dyn Mem`.
pub trait Mem {
    /// Allocate `size` bytes aligned to [`alignment`](Mem::alignment).
    ///
    /// The contents are unspecified.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError>;

    /// Resize a block, possibly moving it.
    ///
    /// `None` allocates a fresh block. On success the first
    /// `min(old size, size)` bytes are preserved and the old pointer must no
    /// longer be used unless it was returned again. On failure the old block
    /// is still valid.
    ///
    /// # Safety
    ///
    /// `ptr`, if given, must have been returned by this allocator and not
    /// deallocated since.
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError>;

    /// Give a block back.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not deallocated
    /// since. The block must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);

    /// Alignment guaranteed for every returned block.
    fn alignment(&self) -> usize {
        ALIGNMENT
    }

    /// Allocate `size` zero-filled bytes.
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(size)?;
        // SAFETY: the block was just allocated with at least `size` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Allocate `count * elem_size` zero-filled bytes.
    ///
    /// Fails with [`AllocError::SizeOverflow`] if the product overflows.
    fn allocate_array_sized(
        &self,
        count: usize,
        elem_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let size = count
            .checked_mul(elem_size)
            .ok_or(AllocError::SizeOverflow)?;
        self.allocate_zeroed(size)
    }
}

impl<M: Mem + ?Sized> Mem for &M {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(size)
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).reallocate(ptr, size)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        (**self).deallocate(ptr)
    }

    fn alignment(&self) -> usize {
        (**self).alignment()
    }
}

/// Typed helpers available on every [`Mem`], including `dyn Mem`.
pub trait MemExt: Mem {
    /// Allocate a zero-filled array of `count` values of `T`.
    ///
    /// Fails with [`AllocError::UnsupportedAlignment`] if `T` needs more
    /// alignment than the allocator provides.
    fn allocate_array<T>(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        check_alignment::<T>(self.alignment())?;
        Ok(self.allocate_array_sized(count, size_of::<T>())?.cast())
    }
}

impl<M: Mem + ?Sized> MemExt for M {}

/// Free-function form of [`Mem::allocate_zeroed`].
pub fn allocate_zeroed<M: Mem + ?Sized>(mem: &M, size: usize) -> Result<NonNull<u8>, AllocError> {
    mem.allocate_zeroed(size)
}

/// Free-function form of [`Mem::allocate_array_sized`].
pub fn allocate_array_sized<M: Mem + ?Sized>(
    mem: &M,
    count: usize,
    elem_size: usize,
) -> Result<NonNull<u8>, AllocError> {
    mem.allocate_array_sized(count, elem_size)
}

/// Free-function form of [`MemExt::allocate_array`].
pub fn allocate_array<T, M: Mem + ?Sized>(mem: &M, count: usize) -> Result<NonNull<T>, AllocError> {
    mem.allocate_array::<T>(count)
}

/// Fail unless `T` fits the given allocator alignment.
pub fn check_alignment<T>(max: usize) -> Result<(), AllocError> {
    let align = align_of::<T>();
    if align > max {
        return Err(AllocError::UnsupportedAlignment { align, max });
    }
    Ok(())
}

/// [`Mem`] view of an [`Arena`]; see [`Arena::as_mem`].
///
/// Zero-size requests are promoted to one [`ALIGNMENT`] unit so every
/// block has its own address. Deallocating the most recent block truncates
/// the arena; deallocating anything else is a no-op and the bytes are
/// reclaimed when the arena is truncated, cleared or dropped.
pub struct ArenaMem<'a, V: VirtualMemory> {
    arena: RefCell<&'a mut Arena<V>>,
}

impl<V: VirtualMemory> Arena<V> {
    /// Borrow the arena as a [`Mem`].
    pub fn as_mem(&mut self) -> ArenaMem<'_, V> {
        ArenaMem {
            arena: RefCell::new(self),
        }
    }
}

impl<V: VirtualMemory> ArenaMem<'_, V> {
    /// Bytes currently handed out by the underlying arena.
    pub fn allocated(&self) -> usize {
        self.arena.borrow().allocated()
    }
}

impl<V: VirtualMemory> Mem for ArenaMem<'_, V> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.arena.borrow_mut().allocate(size.max(ALIGNMENT))
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let size = size.max(ALIGNMENT);
        let mut arena = self.arena.borrow_mut();
        match ptr {
            Some(ptr) => arena.reallocate(ptr, size),
            None => arena.allocate(size),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let mut arena = self.arena.borrow_mut();
        if arena.is_top(ptr) {
            arena.deallocate(ptr);
        }
    }
}

impl<V: VirtualMemory> fmt::Debug for ArenaMem<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ArenaMem").field(&*self.arena.borrow()).finish()
    }
}

/// [`Mem`] view of a [`Heap`]; see [`Heap::as_mem`].
pub struct HeapMem<'a, V: VirtualMemory> {
    heap: RefCell<&'a mut Heap<V>>,
}

impl<V: VirtualMemory> Heap<V> {
    /// Borrow the heap as a [`Mem`].
    pub fn as_mem(&mut self) -> HeapMem<'_, V> {
        HeapMem {
            heap: RefCell::new(self),
        }
    }
}

impl<V: VirtualMemory> HeapMem<'_, V> {
    /// Occupancy of the underlying heap.
    pub fn stats(&self) -> crate::heap::HeapStats {
        self.heap.borrow().stats()
    }
}

impl<V: VirtualMemory> Mem for HeapMem<'_, V> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.heap.borrow_mut().allocate(size)
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        self.heap.borrow_mut().reallocate(ptr, size)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // Rejected pointers are logged by the heap and leave it untouched.
        let _ = self.heap.borrow_mut().deallocate(ptr);
    }
}

impl<V: VirtualMemory> fmt::Debug for HeapMem<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeapMem").field(&*self.heap.borrow()).finish()
    }
}
