//! Arena and heap allocators behind a common [`Mem`] interface.
//!
//! Both allocators sit on a single reservation obtained from a
//! [`VirtualMemory`](bedrock_vm::VirtualMemory) provider and commit pages
//! only as they are needed.
//!
//! # Architecture
//!
//! ```text
//! Arena (bump, LIFO release)          Heap (first fit, split + coalesce)
//! ├── LevelGuard / ArenaLevel         └── in-band block headers
//! ├── ScratchBlock (top block)
//! └── Region ─────────────┬──────────────── Region
//!                         └── VirtualMemory (reserve / commit / release)
//!
//! Mem (&dyn Mem)
//! ├── ArenaMem   ── Arena::as_mem
//! ├── HeapMem    ── Heap::as_mem
//! ├── SystemMem  ── malloc / realloc / free
//! └── SmartMem   ── any Mem, plus a table of live blocks
//! ```
//!
//! Every block any allocator hands out is aligned to [`ALIGNMENT`] bytes.
//! Failures are reported through [`AllocError`]; nothing in this crate
//! panics on allocator misuse.
//!
//! # Example
//!
//! ```
//! use bedrock_alloc::{Arena, Mem, SmartMem};
//!
//! let mut arena = Arena::with_capacity(1 << 20).unwrap();
//! {
//!     let mut scope = arena.level();
//!     let mem = scope.as_mem();
//!     let smart = SmartMem::new(&mem);
//!     for size in [8, 64, 512] {
//!         smart.allocate(size).unwrap();
//!     }
//!     assert_eq!(smart.live(), 3);
//! }
//! assert_eq!(arena.allocated(), 0);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod align;
pub mod arena;
pub mod config;
pub mod error;
pub mod heap;
pub mod level;
pub mod mem;
mod region;
pub mod scratch;
pub mod smart;
pub mod system;

// Public re-exports for the primary API surface.
pub use align::ALIGNMENT;
pub use arena::Arena;
pub use config::{ArenaConfig, HeapConfig, SmartConfig};
pub use error::{AllocError, ErrorKind};
pub use heap::{BlockInfo, Heap, HeapStats, HEADER_SIZE};
pub use level::{ArenaLevel, LevelGuard};
pub use mem::{allocate_array, allocate_array_sized, allocate_zeroed, ArenaMem, HeapMem, Mem, MemExt};
pub use scratch::ScratchBlock;
pub use smart::SmartMem;
pub use system::SystemMem;
