//! Allocator configuration parameters.

use crate::error::AllocError;

/// Configuration for [`Arena`](crate::Arena).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Bytes of address space to reserve up front.
    ///
    /// Default: 1 GiB. Rounded up to [`ALIGNMENT`](crate::ALIGNMENT).
    /// Nothing is committed until the first allocation touches it.
    pub reserve_size: usize,

    /// Minimum number of bytes committed whenever the arena grows.
    ///
    /// Default: 8 KiB. Must be a power of two; rounded up to the
    /// provider's page size.
    pub commit_granularity: usize,
}

impl ArenaConfig {
    /// Default reservation: 1 GiB.
    pub const DEFAULT_RESERVE_SIZE: usize = 1 << 30;

    /// Default commit granularity: 8 KiB.
    pub const DEFAULT_COMMIT_GRANULARITY: usize = 8 * 1024;

    /// Create a config reserving `reserve_size` bytes.
    ///
    /// A `reserve_size` of zero selects [`Self::DEFAULT_RESERVE_SIZE`].
    pub fn new(reserve_size: usize) -> Self {
        Self {
            reserve_size: if reserve_size == 0 {
                Self::DEFAULT_RESERVE_SIZE
            } else {
                reserve_size
            },
            commit_granularity: Self::DEFAULT_COMMIT_GRANULARITY,
        }
    }

    /// Check every field against its documented constraints.
    pub fn validate(&self) -> Result<(), AllocError> {
        validate_region(self.reserve_size, self.commit_granularity)
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Configuration for [`Heap`](crate::Heap).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes of address space to reserve up front. Default: 1 GiB.
    pub reserve_size: usize,

    /// Minimum number of bytes committed whenever the chain grows.
    ///
    /// Default: 8 KiB. Same constraints as
    /// [`ArenaConfig::commit_granularity`].
    pub commit_granularity: usize,
}

impl HeapConfig {
    /// Default reservation: 1 GiB.
    pub const DEFAULT_RESERVE_SIZE: usize = 1 << 30;

    /// Default commit granularity: 8 KiB.
    pub const DEFAULT_COMMIT_GRANULARITY: usize = 8 * 1024;

    /// Create a config reserving `reserve_size` bytes (zero = default).
    pub fn new(reserve_size: usize) -> Self {
        Self {
            reserve_size: if reserve_size == 0 {
                Self::DEFAULT_RESERVE_SIZE
            } else {
                reserve_size
            },
            commit_granularity: Self::DEFAULT_COMMIT_GRANULARITY,
        }
    }

    /// Check every field against its documented constraints.
    pub fn validate(&self) -> Result<(), AllocError> {
        validate_region(self.reserve_size, self.commit_granularity)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Configuration for [`SmartMem`](crate::SmartMem).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmartConfig {
    /// Minimum number of slots added each time the tracking table grows.
    ///
    /// Default: 16. The table grows by the larger of this and half its
    /// current capacity.
    pub growth_increment: usize,

    /// Hard ceiling on simultaneously tracked blocks.
    ///
    /// Default: 65 536. Allocations beyond it fail with
    /// [`AllocError::TableFull`].
    pub max_blocks: usize,
}

impl SmartConfig {
    /// Default growth increment: 16 slots.
    pub const DEFAULT_GROWTH_INCREMENT: usize = 16;

    /// Default maximum tracked blocks.
    pub const DEFAULT_MAX_BLOCKS: usize = 65_536;

    /// Create a config with the given block ceiling.
    pub fn new(max_blocks: usize) -> Self {
        Self {
            growth_increment: Self::DEFAULT_GROWTH_INCREMENT,
            max_blocks,
        }
    }

    /// Check every field against its documented constraints.
    pub fn validate(&self) -> Result<(), AllocError> {
        if self.growth_increment == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "growth_increment must be at least 1".into(),
            });
        }
        if self.max_blocks == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "max_blocks must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_BLOCKS)
    }
}

fn validate_region(reserve_size: usize, commit_granularity: usize) -> Result<(), AllocError> {
    if reserve_size == 0 {
        return Err(AllocError::InvalidConfig {
            reason: "reserve_size must be non-zero".into(),
        });
    }
    if !commit_granularity.is_power_of_two() {
        return Err(AllocError::InvalidConfig {
            reason: format!(
                "commit_granularity must be a non-zero power of two (got {commit_granularity})"
            ),
        });
    }
    Ok(())
}
