//! First-fit free-list heap over a reserved range.
//!
//! Blocks are laid out back to back from the base of the reservation. Each
//! payload is preceded by an in-band [`HEADER_SIZE`]-byte header:
//!
//! ```text
//! ┌────────┬───────────┬────────┬───────────┬─────┐
//! │ header │ payload   │ header │ payload   │ ... │  end
//! └────────┴───────────┴────────┴───────────┴─────┘
//!   next ─────────────────►
//!                ◄───────────── prev
//! ```
//!
//! The chain is doubly linked in address order. The first block's `prev`
//! points at the last block so appends need no scan; the last block's
//! `next` is null. Freed blocks are merged with free neighbours straight
//! away, so the chain never holds two adjacent free blocks.
//!
//! Every pointer handed back to the heap is validated against the chain
//! before anything is modified.

#![allow(unsafe_code)]

use std::fmt;
use std::mem::size_of;
use std::ptr::{self, NonNull};

use bedrock_vm::{SystemVm, VirtualMemory};
use tracing::warn;

use crate::align::{align_up, is_aligned, ALIGNMENT};
use crate::config::HeapConfig;
use crate::error::AllocError;
use crate::region::Region;

const BLOCK_FREE: usize = 0x4652_4545;
const BLOCK_USED: usize = 0x5553_4544;

#[repr(C)]
struct BlockHeader {
    next: *mut BlockHeader,
    prev: *mut BlockHeader,
    /// Payload bytes, a multiple of [`ALIGNMENT`].
    size: usize,
    state: usize,
}

/// Bytes taken by a block header; payloads start this far past it.
pub const HEADER_SIZE: usize =
    (size_of::<BlockHeader>() + ALIGNMENT - 1) & !(ALIGNMENT - 1);

/// Occupancy summary of a [`Heap`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes of address space reserved.
    pub reserved: usize,
    /// Bytes committed.
    pub committed: usize,
    /// Payload bytes in allocated blocks.
    pub used_bytes: usize,
    /// Payload bytes in free blocks.
    pub free_bytes: usize,
    /// Number of blocks in the chain.
    pub blocks: usize,
    /// Number of free blocks in the chain.
    pub free_blocks: usize,
}

/// One block of the chain, as reported by [`Heap::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload offset from the heap base.
    pub offset: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Whether the block is free.
    pub free: bool,
}

/// Free-list allocator with block splitting and coalescing.
///
/// Not thread-safe.
pub struct Heap<V: VirtualMemory = SystemVm> {
    region: Region<V>,
    /// Offset just past the last block's payload.
    end: usize,
    blocks: usize,
}

impl Heap<SystemVm> {
    /// Reserve a heap from the operating system.
    pub fn new(config: HeapConfig) -> Result<Self, AllocError> {
        Self::with_vm(config, SystemVm)
    }

    /// Reserve a heap of `size` bytes; zero selects the 1 GiB default.
    pub fn with_capacity(size: usize) -> Result<Self, AllocError> {
        Self::new(HeapConfig::new(size))
    }
}

impl<V: VirtualMemory> Heap<V> {
    /// Reserve a heap from the given provider. The chain starts empty.
    pub fn with_vm(config: HeapConfig, vm: V) -> Result<Self, AllocError> {
        config.validate()?;
        let region = Region::reserve(vm, config.reserve_size, config.commit_granularity)?;
        Ok(Self {
            region,
            end: 0,
            blocks: 0,
        })
    }

    /// Allocate at least `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// Zero-sized requests get one alignment unit. The first free block
    /// that fits is used; failing that a free last block is extended, and
    /// failing that a new block is appended. A block larger than needed by
    /// more than one header is split and the tail stays free.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = align_up(size.max(1), ALIGNMENT).ok_or(AllocError::SizeOverflow)?;

        // SAFETY: every header reached from `first` lies inside the
        // committed chain; the chain is only modified by this type.
        unsafe {
            let mut block = self.first();
            while !block.is_null() {
                if (*block).state == BLOCK_FREE && (*block).size >= size {
                    (*block).state = BLOCK_USED;
                    self.split(block, size);
                    return Ok(self.payload(block));
                }
                block = (*block).next;
            }

            let last = self.last();
            if !last.is_null() && (*last).state == BLOCK_FREE {
                let payload = self.header_offset(last) + HEADER_SIZE;
                let end = self.chain_end_for(payload, size, (*last).size)?;
                self.region.ensure_committed(end)?;
                (*last).size = size;
                (*last).state = BLOCK_USED;
                self.end = end;
                return Ok(self.payload(last));
            }

            let offset = self.end;
            let end = self.chain_end_for(offset + HEADER_SIZE, size, 0)?;
            self.region.ensure_committed(end)?;
            let block = self.header_at(offset);
            block.write(BlockHeader {
                next: ptr::null_mut(),
                prev: block,
                size,
                state: BLOCK_USED,
            });
            if !last.is_null() {
                (*block).prev = last;
                (*last).next = block;
                (*self.first()).prev = block;
            }
            self.end = end;
            self.blocks += 1;
            Ok(self.payload(block))
        }
    }

    /// Allocate `size` zero-filled bytes.
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(size)?;
        // SAFETY: the block holds at least `size` committed bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Resize the block at `ptr` to `size` bytes.
    ///
    /// `None` behaves as [`allocate`](Self::allocate). If the aligned size
    /// is unchanged the same pointer is returned; otherwise the contents are
    /// moved to a new block and the old one is freed. On failure the old
    /// block stays allocated and untouched.
    pub fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(ptr) = ptr else {
            return self.allocate(size);
        };
        let block = self.checked(ptr)?;
        let aligned = align_up(size.max(1), ALIGNMENT).ok_or(AllocError::SizeOverflow)?;
        // SAFETY: `block` passed validation; it stays allocated (and in
        // place) while the new block is carved out.
        unsafe {
            let old = (*block).size;
            if aligned == old {
                return Ok(ptr);
            }
            let fresh = self.allocate(size)?;
            ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old.min(aligned));
            self.release(block);
            Ok(fresh)
        }
    }

    /// Return the block at `ptr` to the free list.
    ///
    /// The block is merged with free neighbours. Invalid pointers are
    /// rejected without modifying the heap.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let block = self.checked(ptr)?;
        // SAFETY: validated allocated block.
        unsafe { self.release(block) };
        Ok(())
    }

    /// Payload size of the allocated block at `ptr`.
    pub fn block_size(&self, ptr: NonNull<u8>) -> Result<usize, AllocError> {
        let block = self.checked(ptr)?;
        // SAFETY: validated block header.
        Ok(unsafe { (*block).size })
    }

    /// Release the reservation. Equivalent to dropping the heap.
    pub fn free(self) {
        drop(self);
    }

    /// Occupancy summary.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            reserved: self.region.size(),
            committed: self.region.committed(),
            ..HeapStats::default()
        };
        for block in self.blocks() {
            stats.blocks += 1;
            if block.free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
            } else {
                stats.used_bytes += block.size;
            }
        }
        stats
    }

    /// Walk the chain in address order.
    pub fn blocks(&self) -> Blocks<'_, V> {
        Blocks {
            heap: self,
            // SAFETY: reads the first header only when the chain is non-empty.
            block: unsafe { self.first() },
        }
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// Bytes of address space reserved.
    pub fn reserved(&self) -> usize {
        self.region.size()
    }

    /// Bytes committed.
    pub fn committed(&self) -> usize {
        self.region.committed()
    }

    /// Base address of the reservation.
    pub fn base(&self) -> NonNull<u8> {
        self.region.base()
    }

    /// Validate `ptr`, logging why it was rejected.
    fn checked(&self, ptr: NonNull<u8>) -> Result<*mut BlockHeader, AllocError> {
        self.validate(ptr).inspect_err(|err| {
            warn!(ptr = ?ptr, error = %err, "heap rejected pointer");
        })
    }

    /// Check that `ptr` is the payload of an allocated block of this chain.
    ///
    /// Every header read stays inside `[0, end)`, which is committed.
    fn validate(&self, ptr: NonNull<u8>) -> Result<*mut BlockHeader, AllocError> {
        let payload = self.region.offset_of(ptr).ok_or(AllocError::ForeignPointer)?;
        if payload < HEADER_SIZE || payload >= self.end {
            return Err(AllocError::ForeignPointer);
        }
        if !is_aligned(payload, ALIGNMENT) {
            return Err(AllocError::Misaligned);
        }
        let block = self.header_at(payload - HEADER_SIZE);

        // SAFETY: the header lies in [0, end) per the range check above.
        unsafe {
            let size = (*block).size;
            if size == 0 || !is_aligned(size, ALIGNMENT) || size > self.end - payload {
                return Err(AllocError::CorruptHeader);
            }
            match (*block).state {
                BLOCK_USED => {}
                BLOCK_FREE => return Err(AllocError::DoubleFree),
                _ => return Err(AllocError::CorruptHeader),
            }

            let next_offset = payload + size;
            let next = (*block).next;
            if next_offset == self.end {
                if !next.is_null() {
                    return Err(AllocError::ForeignPointer);
                }
            } else if next_offset + HEADER_SIZE > self.end
                || next != self.header_at(next_offset)
                || (*next).prev != block
            {
                return Err(AllocError::ForeignPointer);
            }

            let prev = (*block).prev;
            let prev_offset = self
                .region
                .offset_of(NonNull::new(prev.cast::<u8>()).ok_or(AllocError::ForeignPointer)?)
                .ok_or(AllocError::ForeignPointer)?;
            if !is_aligned(prev_offset, ALIGNMENT) || prev_offset + HEADER_SIZE > self.end {
                return Err(AllocError::ForeignPointer);
            }
            let linked = if payload == HEADER_SIZE {
                (*prev).next.is_null()
            } else {
                (*prev).next == block
            };
            if !linked {
                return Err(AllocError::ForeignPointer);
            }
        }
        Ok(block)
    }

    /// Mark `block` free and merge it with free neighbours.
    ///
    /// # Safety
    ///
    /// `block` must be an allocated block of this chain.
    unsafe fn release(&mut self, block: *mut BlockHeader) {
        (*block).state = BLOCK_FREE;
        self.coalesce(block);
    }

    /// Merge `block` (free) with every adjacent free block.
    ///
    /// # Safety
    ///
    /// `block` must be a free block of this chain.
    unsafe fn coalesce(&mut self, mut block: *mut BlockHeader) -> *mut BlockHeader {
        let first = self.first();
        while block != first && (*(*block).prev).state == BLOCK_FREE {
            let prev = (*block).prev;
            self.merge(prev, block);
            block = prev;
        }
        while !(*block).next.is_null() && (*(*block).next).state == BLOCK_FREE {
            self.merge(block, (*block).next);
        }
        block
    }

    /// Absorb `b` (which directly follows `a`) into `a`.
    ///
    /// `b`'s header is left as it was; it is payload of `a` from now on.
    ///
    /// # Safety
    ///
    /// `a` and `b` must be adjacent blocks of this chain with `a.next == b`.
    unsafe fn merge(&mut self, a: *mut BlockHeader, b: *mut BlockHeader) {
        (*a).size += HEADER_SIZE + (*b).size;
        (*a).next = (*b).next;
        if (*b).next.is_null() {
            (*self.first()).prev = a;
        } else {
            (*(*b).next).prev = a;
        }
        self.blocks -= 1;
    }

    /// Shrink `block` to `size` bytes if the remainder can hold a header
    /// and a minimal payload; the remainder becomes a free block.
    ///
    /// # Safety
    ///
    /// `block` must be an allocated block of this chain with
    /// `size <= block.size`.
    unsafe fn split(&mut self, block: *mut BlockHeader, size: usize) {
        let spare = (*block).size - size;
        if spare <= HEADER_SIZE {
            return;
        }
        let tail = self.header_at(self.header_offset(block) + HEADER_SIZE + size);
        tail.write(BlockHeader {
            next: (*block).next,
            prev: block,
            size: spare - HEADER_SIZE,
            state: BLOCK_FREE,
        });
        if (*block).next.is_null() {
            (*self.first()).prev = tail;
        } else {
            (*(*block).next).prev = tail;
        }
        (*block).next = tail;
        (*block).size = size;
        self.blocks += 1;
        self.coalesce(tail);
    }

    /// Chain end after placing a `size`-byte payload at offset `payload`,
    /// where `reused` bytes of it are already part of the chain.
    fn chain_end_for(&self, payload: usize, size: usize, reused: usize) -> Result<usize, AllocError> {
        let end = payload.checked_add(size).ok_or(AllocError::SizeOverflow)?;
        if end > self.region.size() {
            return Err(AllocError::Exhausted {
                requested: size,
                available: (self.region.size() - self.end) + reused,
            });
        }
        Ok(end)
    }

    /// First block, or null for an empty chain.
    ///
    /// # Safety
    ///
    /// The chain must be consistent.
    unsafe fn first(&self) -> *mut BlockHeader {
        if self.end == 0 {
            ptr::null_mut()
        } else {
            self.header_at(0)
        }
    }

    /// Last block, or null for an empty chain.
    ///
    /// # Safety
    ///
    /// The chain must be consistent.
    unsafe fn last(&self) -> *mut BlockHeader {
        let first = self.first();
        if first.is_null() {
            first
        } else {
            (*first).prev
        }
    }

    fn header_at(&self, offset: usize) -> *mut BlockHeader {
        self.region.at(offset).as_ptr().cast()
    }

    fn header_offset(&self, block: *mut BlockHeader) -> usize {
        block as usize - self.region.base().as_ptr() as usize
    }

    fn payload(&self, block: *mut BlockHeader) -> NonNull<u8> {
        self.region.at(self.header_offset(block) + HEADER_SIZE)
    }
}

impl<V: VirtualMemory> fmt::Debug for Heap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("base", &self.region.base())
            .field("reserved", &self.region.size())
            .field("committed", &self.region.committed())
            .field("end", &self.end)
            .field("blocks", &self.blocks)
            .finish()
    }
}

/// Iterator over the blocks of a [`Heap`]; see [`Heap::blocks`].
pub struct Blocks<'a, V: VirtualMemory> {
    heap: &'a Heap<V>,
    block: *mut BlockHeader,
}

impl<V: VirtualMemory> Iterator for Blocks<'_, V> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.block.is_null() {
            return None;
        }
        // SAFETY: the heap is borrowed, so the chain cannot change while we
        // walk it, and every `next` link is a live header or null.
        unsafe {
            let info = BlockInfo {
                offset: self.heap.header_offset(self.block) + HEADER_SIZE,
                size: (*self.block).size,
                free: (*self.block).state == BLOCK_FREE,
            };
            self.block = (*self.block).next;
            Some(info)
        }
    }
}
