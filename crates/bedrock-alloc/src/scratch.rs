//! Growable scratch buffers at the top of an arena.
//!
//! A [`ScratchBlock`] holds the arena's most recent allocation and borrows
//! the arena mutably, so nothing else can be bumped behind it. That makes
//! every resize an in-place move of the bump offset.

#![allow(unsafe_code)]

use std::ptr::{self, NonNull};
use std::slice;

use bedrock_vm::VirtualMemory;

use crate::arena::Arena;
use crate::error::AllocError;

impl<V: VirtualMemory> Arena<V> {
    /// Allocate a zero-filled block of `len` bytes that can be resized in
    /// place.
    ///
    /// ```
    /// use bedrock_alloc::Arena;
    ///
    /// let mut arena = Arena::with_capacity(1 << 16).unwrap();
    /// let mut block = arena.scratch(4).unwrap();
    /// block.as_mut_slice().copy_from_slice(b"abcd");
    /// block.resize(8).unwrap();
    /// assert_eq!(block.as_slice(), b"abcd\0\0\0\0");
    /// let bytes = block.finish();
    /// assert_eq!(bytes.len(), 8);
    /// ```
    pub fn scratch(&mut self, len: usize) -> Result<ScratchBlock<'_, V>, AllocError> {
        let start = self.allocate_zeroed(len)?;
        let offset = start.as_ptr() as usize - self.base().as_ptr() as usize;
        Ok(ScratchBlock {
            arena: self,
            offset,
            len,
        })
    }
}

/// The top block of an arena; see [`Arena::scratch`].
pub struct ScratchBlock<'a, V: VirtualMemory> {
    arena: &'a mut Arena<V>,
    offset: usize,
    len: usize,
}

impl<V: VirtualMemory> ScratchBlock<'_, V> {
    /// Resize the block to `len` bytes without moving it.
    ///
    /// New bytes are zeroed. Fails only when growing past the reservation,
    /// in which case the block is unchanged.
    pub fn resize(&mut self, len: usize) -> Result<(), AllocError> {
        self.arena.resize_top(self.offset, len)?;
        if len > self.len {
            // SAFETY: resize_top committed [offset, offset + len).
            unsafe { ptr::write_bytes(self.as_ptr().as_ptr().add(self.len), 0, len - self.len) };
        }
        self.len = len;
        Ok(())
    }

    /// Number of usable bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the block.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.arena.region.at(self.offset)
    }

    /// The block's bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block is committed, initialized (zero-filled on
        // creation and growth) and exclusively owned through the arena borrow.
        unsafe { slice::from_raw_parts(self.as_ptr().as_ptr(), self.len) }
    }

    /// The block's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`, and `&mut self` makes the access unique.
        unsafe { slice::from_raw_parts_mut(self.as_ptr().as_ptr(), self.len) }
    }

    /// Keep the block and release the arena borrow.
    ///
    /// The returned memory stays valid until the arena is truncated past it
    /// or dropped.
    pub fn finish(self) -> NonNull<[u8]> {
        NonNull::slice_from_raw_parts(self.as_ptr(), self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_is_zeroed_and_on_top() {
        let mut arena = Arena::with_capacity(1 << 16).unwrap();
        arena.allocate(32).unwrap();
        let block = arena.scratch(10).unwrap();
        assert_eq!(block.len(), 10);
        assert!(block.as_slice().iter().all(|&b| b == 0));
        let ptr = block.as_ptr();
        drop(block);
        assert!(arena.is_top(ptr));
        assert_eq!(arena.allocated(), 48);
    }

    #[test]
    fn grow_keeps_contents_and_address() {
        let mut arena = Arena::with_capacity(1 << 16).unwrap();
        let mut block = arena.scratch(3).unwrap();
        block.as_mut_slice().copy_from_slice(b"xyz");
        let before = block.as_ptr();
        block.resize(5000).unwrap();
        assert_eq!(block.as_ptr(), before);
        assert_eq!(&block.as_slice()[..3], b"xyz");
        assert!(block.as_slice()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn shrink_then_grow_rezeroes_tail() {
        let mut arena = Arena::with_capacity(1 << 16).unwrap();
        let mut block = arena.scratch(8).unwrap();
        block.as_mut_slice().fill(0xAA);
        block.resize(2).unwrap();
        block.resize(8).unwrap();
        assert_eq!(block.as_slice(), &[0xAA, 0xAA, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn shrink_returns_space_to_arena() {
        let mut arena = Arena::with_capacity(1 << 16).unwrap();
        let mut block = arena.scratch(1024).unwrap();
        block.resize(16).unwrap();
        let bytes = block.finish();
        assert_eq!(bytes.len(), 16);
        assert_eq!(arena.allocated(), 16);
    }

    #[test]
    fn failed_grow_leaves_block_intact() {
        let mut arena = Arena::with_capacity(4096).unwrap();
        let mut block = arena.scratch(16).unwrap();
        block.as_mut_slice()[0] = 7;
        assert!(matches!(block.resize(8192), Err(AllocError::Exhausted { .. })));
        assert_eq!(block.len(), 16);
        assert_eq!(block.as_slice()[0], 7);
        drop(block);
        assert_eq!(arena.allocated(), 16);
    }

    #[test]
    fn empty_scratch_can_grow() {
        let mut arena = Arena::with_capacity(4096).unwrap();
        let mut block = arena.scratch(0).unwrap();
        assert!(block.is_empty());
        block.resize(40).unwrap();
        assert_eq!(block.len(), 40);
    }
}
