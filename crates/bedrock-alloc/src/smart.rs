//! Tracking allocator that frees everything at once.
//!
//! [`SmartMem`] forwards every request to a parent [`Mem`] and records each
//! live block in a slot table, itself allocated from the parent. Clearing
//! or dropping the smart allocator hands every recorded block back to the
//! parent, so code that allocates many small pieces can skip freeing them
//! one by one.
//!
//! Lookups scan the table linearly; the table is meant for hundreds to a
//! few thousand blocks, not as a general-purpose index.

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::mem::size_of;
use std::ptr::NonNull;
use std::slice;

use tracing::{debug, warn};

use crate::config::SmartConfig;
use crate::error::AllocError;
use crate::mem::Mem;

type Slot = Option<NonNull<u8>>;

struct SlotTable {
    slots: Option<NonNull<Slot>>,
    capacity: usize,
    live: usize,
}

impl SlotTable {
    fn slots(&self) -> &[Slot] {
        match self.slots {
            // SAFETY: `capacity` slots were allocated and initialized in `grow`.
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.capacity) },
            None => &[],
        }
    }

    fn slots_mut(&mut self) -> &mut [Slot] {
        match self.slots {
            // SAFETY: as in `slots`; `&mut self` makes the access unique.
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.capacity) },
            None => &mut [],
        }
    }

    fn find(&self, ptr: Slot) -> Option<usize> {
        self.slots().iter().position(|slot| *slot == ptr)
    }
}

/// [`Mem`] that remembers every block it hands out.
pub struct SmartMem<'p> {
    parent: &'p dyn Mem,
    config: SmartConfig,
    table: RefCell<SlotTable>,
}

impl<'p> SmartMem<'p> {
    /// Track allocations from `parent` with the default configuration.
    ///
    /// No table memory is allocated until the first block.
    pub fn new(parent: &'p dyn Mem) -> Self {
        Self {
            parent,
            config: SmartConfig::default(),
            table: RefCell::new(SlotTable {
                slots: None,
                capacity: 0,
                live: 0,
            }),
        }
    }

    /// Track allocations from `parent` with a custom configuration.
    pub fn with_config(parent: &'p dyn Mem, config: SmartConfig) -> Result<Self, AllocError> {
        config.validate()?;
        let mut smart = Self::new(parent);
        smart.config = config;
        Ok(smart)
    }

    /// Number of blocks currently tracked.
    pub fn live(&self) -> usize {
        self.table.borrow().live
    }

    /// Number of slots in the tracking table.
    pub fn capacity(&self) -> usize {
        self.table.borrow().capacity
    }

    /// Whether `ptr` is a block currently tracked by this allocator.
    pub fn is_tracked(&self, ptr: NonNull<u8>) -> bool {
        self.table.borrow().find(Some(ptr)).is_some()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SmartConfig {
        &self.config
    }

    /// Give every tracked block back to the parent.
    ///
    /// The table is kept for reuse.
    pub fn clear(&mut self) {
        let table = self.table.get_mut();
        let released = table.live;
        for slot in table.slots_mut() {
            if let Some(ptr) = slot.take() {
                // SAFETY: tracked blocks came from `parent` and are still live.
                unsafe { self.parent.deallocate(ptr) };
            }
        }
        table.live = 0;
        debug!(released, "smart allocator cleared");
    }

    /// Release every tracked block and the table. Same as dropping.
    pub fn free(self) {
        drop(self);
    }

    /// Index of an empty slot, growing the table if none is left.
    fn empty_slot(&self, table: &mut SlotTable) -> Result<usize, AllocError> {
        if let Some(index) = table.find(None) {
            return Ok(index);
        }
        let index = table.capacity;
        self.grow(table)?;
        Ok(index)
    }

    fn grow(&self, table: &mut SlotTable) -> Result<(), AllocError> {
        let max = self.config.max_blocks;
        if table.capacity >= max {
            warn!(max, "smart allocator table full");
            return Err(AllocError::TableFull { max });
        }
        let step = self.config.growth_increment.max(table.capacity / 2);
        let capacity = table.capacity.saturating_add(step).min(max);
        let bytes = capacity
            .checked_mul(size_of::<Slot>())
            .ok_or(AllocError::SizeOverflow)?;
        // SAFETY: the table pointer, if any, came from `parent`.
        let fresh = unsafe { self.parent.reallocate(table.slots.map(NonNull::cast), bytes)? };
        let slots = fresh.cast::<Slot>();
        for index in table.capacity..capacity {
            // SAFETY: index < capacity and the block holds `capacity` slots.
            unsafe { slots.as_ptr().add(index).write(None) };
        }
        table.slots = Some(slots);
        table.capacity = capacity;
        Ok(())
    }
}

impl Mem for SmartMem<'_> {
    /// Allocate from the parent and track the block.
    ///
    /// The table is grown before the parent is asked for the block, so a
    /// [`AllocError::TableFull`] failure takes nothing from the parent.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let mut table = self.table.borrow_mut();
        let index = self.empty_slot(&mut table)?;
        let ptr = self.parent.allocate(size)?;
        table.slots_mut()[index] = Some(ptr);
        table.live += 1;
        Ok(ptr)
    }

    /// Resize a tracked block through the parent.
    ///
    /// Fails with [`AllocError::ForeignPointer`] for blocks this allocator
    /// does not track.
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(ptr) = ptr else {
            return self.allocate(size);
        };
        let mut table = self.table.borrow_mut();
        let index = table.find(Some(ptr)).ok_or(AllocError::ForeignPointer)?;
        let fresh = self.parent.reallocate(Some(ptr), size)?;
        table.slots_mut()[index] = Some(fresh);
        Ok(fresh)
    }

    /// Free a tracked block through the parent. Untracked pointers are
    /// ignored.
    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let mut table = self.table.borrow_mut();
        if let Some(index) = table.find(Some(ptr)) {
            self.parent.deallocate(ptr);
            table.slots_mut()[index] = None;
            table.live -= 1;
        }
    }

    fn alignment(&self) -> usize {
        self.parent.alignment()
    }
}

impl Drop for SmartMem<'_> {
    fn drop(&mut self) {
        self.clear();
        let table = self.table.get_mut();
        if let Some(slots) = table.slots.take() {
            // SAFETY: the table block came from `parent`.
            unsafe { self.parent.deallocate(slots.cast()) };
        }
        table.capacity = 0;
    }
}

impl fmt::Debug for SmartMem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("SmartMem")
            .field("live", &table.live)
            .field("capacity", &table.capacity)
            .field("config", &self.config)
            .finish()
    }
}
