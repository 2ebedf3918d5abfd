//! Virtual memory provider for the bedrock allocators.
//!
//! This is the leaf crate of the workspace. It defines the boundary the
//! arena and heap allocators use to obtain address space:
//!
//! ```text
//! reserve(size)        -> base        (address space only, no backing)
//! commit(base, size)   -> read/write  (pages become usable)
//! decommit(base, size) -> no access   (backing may be dropped)
//! release(base, size)  -> unmapped    (whole reservation returned)
//! ```
//!
//! [`SystemVm`] implements the boundary on top of the operating system.
//! Allocators are generic over [`VirtualMemory`] so tests can substitute
//! an instrumented provider.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod error;
pub mod provider;
mod sys;

pub use error::VmError;
pub use provider::{SystemVm, VirtualMemory};
