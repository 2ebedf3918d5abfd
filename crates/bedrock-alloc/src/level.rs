//! Arena levels: checkpoints that roll the arena back when closed.
//!
//! Two forms are offered. [`LevelGuard`] is a scope that borrows the arena
//! mutably and restores the saved offset on drop; nested guards are
//! borrowed through their parent, so they can only close innermost-first.
//! [`ArenaLevel`] is a plain checkpoint value for code that cannot hold a
//! borrow across the scope. It is checked when closed: a level from another
//! arena, from before a [`Arena::clear`], or one that is not the innermost
//! open level is rejected.

use std::ops::{Deref, DerefMut};

use bedrock_vm::VirtualMemory;
use tracing::debug;

use crate::arena::Arena;
use crate::error::AllocError;

/// A checkpoint opened with [`Arena::open_level`].
///
/// Must be handed back to [`Arena::close_level`] of the same arena.
/// Dropping it without closing leaves the allocations in place and the
/// level counted as open until the arena is cleared.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unclosed level never rolls the arena back"]
pub struct ArenaLevel {
    arena_id: u64,
    epoch: u32,
    depth: u32,
    position: usize,
}

impl ArenaLevel {
    /// Arena offset that closing this level restores.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Nesting depth of this level (0 for the outermost).
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl<V: VirtualMemory> Arena<V> {
    /// Record the current offset as a new innermost level.
    pub fn open_level(&mut self) -> ArenaLevel {
        let level = ArenaLevel {
            arena_id: self.id,
            epoch: self.epoch,
            depth: self.depth,
            position: self.allocated,
        };
        self.depth += 1;
        level
    }

    /// Close `level`, truncating the arena back to its saved offset.
    ///
    /// Committed pages stay committed.
    pub fn close_level(&mut self, level: ArenaLevel) -> Result<(), AllocError> {
        if level.arena_id != self.id || level.epoch != self.epoch || self.depth == 0 {
            debug!(arena = self.id, "stale arena level rejected");
            return Err(AllocError::StaleLevel);
        }
        let innermost = self.depth - 1;
        if level.depth != innermost {
            debug!(
                expected = innermost,
                found = level.depth,
                "arena level closed out of order"
            );
            return Err(AllocError::LevelOutOfOrder {
                expected: innermost,
                found: level.depth,
            });
        }
        self.depth = innermost;
        self.deallocate_to(level.position);
        Ok(())
    }

    /// Number of raw levels currently open.
    pub fn level_depth(&self) -> u32 {
        self.depth
    }

    /// Open a scoped level.
    ///
    /// The guard dereferences to the arena; everything allocated through it
    /// is discarded when the guard drops.
    ///
    /// ```
    /// use bedrock_alloc::Arena;
    ///
    /// let mut arena = Arena::with_capacity(1 << 16).unwrap();
    /// arena.allocate(64).unwrap();
    /// {
    ///     let mut scope = arena.level();
    ///     scope.allocate(1024).unwrap();
    ///     assert_eq!(scope.allocated(), 64 + 1024);
    /// }
    /// assert_eq!(arena.allocated(), 64);
    /// ```
    pub fn level(&mut self) -> LevelGuard<'_, V> {
        let level = self.open_level();
        LevelGuard {
            arena: self,
            level: Some(level),
        }
    }

    /// Roll back to `level` regardless of levels opened after it.
    fn unwind_to(&mut self, level: &ArenaLevel) {
        if level.arena_id != self.id || level.epoch != self.epoch || level.depth >= self.depth {
            return;
        }
        self.depth = level.depth;
        self.deallocate_to(level.position);
    }
}

/// Scoped arena level; see [`Arena::level`].
pub struct LevelGuard<'a, V: VirtualMemory> {
    arena: &'a mut Arena<V>,
    level: Option<ArenaLevel>,
}

impl<V: VirtualMemory> LevelGuard<'_, V> {
    /// Arena offset this guard restores.
    pub fn position(&self) -> usize {
        self.level.as_ref().map_or(0, ArenaLevel::position)
    }

    /// Close the level now. Same as dropping the guard.
    pub fn close(self) {}
}

impl<V: VirtualMemory> Deref for LevelGuard<'_, V> {
    type Target = Arena<V>;

    fn deref(&self) -> &Arena<V> {
        self.arena
    }
}

impl<V: VirtualMemory> DerefMut for LevelGuard<'_, V> {
    fn deref_mut(&mut self) -> &mut Arena<V> {
        self.arena
    }
}

impl<V: VirtualMemory> Drop for LevelGuard<'_, V> {
    fn drop(&mut self) {
        if let Some(level) = self.level.take() {
            // Raw levels opened through the guard and left open are
            // discarded along with it.
            self.arena.unwind_to(&level);
        }
    }
}
