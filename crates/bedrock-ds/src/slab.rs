//! Slot + generation node storage for the linked containers.
//!
//! Nodes of the list and trees live in a [`Slab`] and refer to each other
//! by [`Handle`]. Removing a node bumps its slot's generation, so handles
//! kept by callers after a removal are detected as stale instead of
//! silently reaching whatever reuses the slot.

use bedrock_alloc::{AllocError, Mem};

use crate::vec::MemVec;

/// Reference to a slab entry: slot index plus the generation it was
/// issued under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the handle was issued under.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with a free list and generation-checked handles.
pub struct Slab<'m, T> {
    slots: MemVec<'m, Slot<T>>,
    /// Capacity is kept at least `slots.len()` so pushes here never
    /// allocate.
    free: MemVec<'m, u32>,
    len: usize,
}

impl<'m, T> Slab<'m, T> {
    /// Create an empty slab drawing memory from `mem`.
    pub fn new(mem: &'m dyn Mem) -> Self {
        Self {
            slots: MemVec::new(mem),
            free: MemVec::new(mem),
            len: 0,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store a value and return its handle.
    pub fn insert(&mut self, value: T) -> Result<Handle, AllocError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(Handle {
                index,
                generation: slot.generation,
            });
        }
        let index = u32::try_from(self.slots.len()).map_err(|_| AllocError::SizeOverflow)?;
        self.free.reserve(self.slots.len() + 1 - self.free.len())?;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        })?;
        self.len += 1;
        Ok(Handle {
            index,
            generation: 0,
        })
    }

    /// Value behind `handle`, or `None` if the handle is stale or was never
    /// issued.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable variant of `get`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// `true` if `handle` refers to a live entry.
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove and return the value behind `handle`.
    ///
    /// The slot's generation is bumped. A slot whose generation wraps back
    /// to zero is retired instead of reused, so no stale handle can ever
    /// match it again.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation != 0 {
            // Cannot fail: capacity covers every slot.
            let _ = self.free.push(handle.index);
        }
        self.len -= 1;
        Some(value)
    }

    /// Drop every value. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                if slot.generation != 0 {
                    let _ = self.free.push(index as u32);
                }
            }
        }
        self.len = 0;
    }

    /// Occupied entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
