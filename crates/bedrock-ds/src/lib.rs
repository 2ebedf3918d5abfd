//! Containers and counted boxes whose storage comes from any [`Mem`].
//!
//! Every container borrows a `&dyn Mem` for its whole life, returns
//! [`AllocError`] from each operation that can allocate, and gives its
//! memory back on drop. The same container code therefore runs unchanged on
//! an arena level, the free-list heap, the process allocator or a smart
//! allocator layered on any of them.
//!
//! Linked containers keep their nodes in a generation-checked [`Slab`], so
//! a node id that outlives its node is reported as stale rather than
//! reaching whatever reused the slot.
//!
//! # Example
//!
//! ```
//! use bedrock_alloc::Heap;
//! use bedrock_ds::{MemMap, MemVec};
//!
//! let mut heap = Heap::with_capacity(1 << 20).unwrap();
//! {
//!     let mem = heap.as_mem();
//!     let mut names = MemVec::new(&mem);
//!     let mut index = MemMap::new(&mem, 32).unwrap();
//!     for name in ["ada", "grace", "edsger"] {
//!         index.put(name, names.len()).unwrap();
//!         names.push(name).unwrap();
//!     }
//!     assert_eq!(index.get("grace"), Some(&1));
//! }
//! assert_eq!(heap.stats().used_bytes, 0);
//! ```
//!
//! [`Mem`]: bedrock_alloc::Mem
//! [`AllocError`]: bedrock_alloc::AllocError

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod binary;
pub mod bits;
pub mod list;
pub mod map;
pub mod rc;
pub mod slab;
pub mod tree;
pub mod vec;

pub use binary::MemBinaryTree;
pub use bits::MemBits;
pub use list::MemList;
pub use map::{hash31, Hash31Hasher, MemMap};
pub use rc::{MemArc, MemRc};
pub use slab::{Handle, Slab};
pub use tree::{MemTree, NodeId};
pub use vec::MemVec;
