//! Bedrock: reserve-and-commit arenas, a free-list heap and containers
//! that run on any allocator.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all bedrock sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use bedrock::prelude::*;
//!
//! let mut arena = Arena::with_capacity(1 << 20).unwrap();
//!
//! // Everything allocated inside the level is released when it closes.
//! {
//!     let mut frame = arena.level();
//!     let mem = frame.as_mem();
//!     let mut list = MemList::new(&mem);
//!     for word in ["reserve", "commit", "release"] {
//!         list.append(word).unwrap();
//!     }
//!     assert_eq!(list.get(1), Some(&"commit"));
//! }
//! assert_eq!(arena.allocated(), 0);
//!
//! // The same container code runs on the free-list heap.
//! let mut heap = Heap::with_capacity(1 << 20).unwrap();
//! {
//!     let mem = heap.as_mem();
//!     let mut squares = MemVec::new(&mem);
//!     for i in 0..100u64 {
//!         squares.push(i * i).unwrap();
//!     }
//!     assert_eq!(squares[9], 81);
//! }
//! assert_eq!(heap.stats().used_bytes, 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`vm`] | `bedrock-vm` | Virtual memory provider: reserve, commit, decommit, release |
//! | [`alloc`] | `bedrock-alloc` | Arena, levels, scratch blocks, heap, `Mem`, smart allocator |
//! | [`ds`] | `bedrock-ds` | Containers and counted boxes over `Mem` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Virtual memory provider (`bedrock-vm`).
///
/// The [`vm::VirtualMemory`] trait and the operating-system implementation
/// [`vm::SystemVm`].
pub use bedrock_vm as vm;

/// Allocators and the allocator interface (`bedrock-alloc`).
///
/// [`alloc::Arena`] with [`alloc::LevelGuard`] and [`alloc::ScratchBlock`],
/// the free-list [`alloc::Heap`], and the [`alloc::Mem`] trait with its
/// arena, heap, system and smart implementations.
pub use bedrock_alloc as alloc;

/// Containers over [`alloc::Mem`] (`bedrock-ds`).
pub use bedrock_ds as ds;

/// Common imports for typical bedrock usage.
///
/// ```rust
/// use bedrock::prelude::*;
/// ```
pub mod prelude {
    // Allocators
    pub use bedrock_alloc::{
        Arena, ArenaLevel, Heap, LevelGuard, ScratchBlock, SmartMem, SystemMem,
    };

    // Allocator interface
    pub use bedrock_alloc::{Mem, MemExt, ALIGNMENT};

    // Configuration and errors
    pub use bedrock_alloc::{AllocError, ArenaConfig, ErrorKind, HeapConfig, SmartConfig};

    // Containers
    pub use bedrock_ds::{
        MemArc, MemBinaryTree, MemBits, MemList, MemMap, MemRc, MemTree, MemVec, NodeId,
    };
}
