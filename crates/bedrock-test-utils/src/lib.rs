//! Test utilities and instrumented collaborators for bedrock development.
//!
//! Provides wrappers around the core traits that record how they are used:
//! [`CountingMem`] checks that every block handed out by a [`Mem`] comes
//! back exactly once, [`CountingVm`] records commit traffic, and
//! [`LimitVm`] refuses commits past a budget. [`fixtures`] holds byte
//! patterns for checking that contents survive moves.
//!
//! [`Mem`]: bedrock_alloc::Mem

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod counting;
pub mod fixtures;
pub mod vm;

pub use counting::CountingMem;
pub use vm::{CountingVm, LimitVm};
