//! Workload profiles shared by the bedrock benchmarks.
//!
//! - [`size_sequence`]: deterministic block sizes via seed
//! - [`churn_plan`]: interleaved allocate/free operations for free-list
//!   allocators
//! - [`ARENA_PROFILE`] / [`HEAP_PROFILE`]: reservation sizes the benches use

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use bedrock_alloc::{ArenaConfig, HeapConfig};

/// Arena reservation for the benches: 256 MiB.
pub const ARENA_PROFILE: usize = 256 << 20;

/// Heap reservation for the benches: 256 MiB.
pub const HEAP_PROFILE: usize = 256 << 20;

/// Arena configuration matching [`ARENA_PROFILE`].
pub fn arena_config() -> ArenaConfig {
    ArenaConfig::new(ARENA_PROFILE)
}

/// Heap configuration matching [`HEAP_PROFILE`].
pub fn heap_config() -> HeapConfig {
    HeapConfig::new(HEAP_PROFILE)
}

fn next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

/// `n` block sizes in `1..=max`, reproducible from `seed`.
///
/// Small sizes dominate: three quarters fall in the lowest eighth of the
/// range, the rest are spread over all of it.
pub fn size_sequence(n: usize, max: usize, seed: u64) -> Vec<usize> {
    let max = max.max(1);
    let small = (max / 8).max(1);
    let mut state = seed;
    (0..n)
        .map(|_| {
            let roll = next(&mut state);
            let bound = if roll % 4 == 0 { max } else { small };
            1 + (next(&mut state) as usize) % bound
        })
        .collect()
}

/// One step of a churn workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChurnOp {
    /// Allocate a block of this many bytes and keep it live.
    Allocate(usize),
    /// Free the live block at this position (modulo the live count).
    Free(usize),
}

/// `n` operations that keep roughly `live` blocks alive at a time.
///
/// The first `live` steps only allocate; after that allocations and frees
/// alternate at random, so the free list sees holes of mixed sizes.
pub fn churn_plan(n: usize, live: usize, max: usize, seed: u64) -> Vec<ChurnOp> {
    let sizes = size_sequence(n, max, seed);
    let mut state = seed ^ 0x9e37_79b9_7f4a_7c15;
    let mut outstanding = 0usize;
    sizes
        .into_iter()
        .map(|size| {
            if outstanding == 0 || outstanding < live || next(&mut state) % 2 == 0 {
                outstanding += 1;
                ChurnOp::Allocate(size)
            } else {
                outstanding -= 1;
                ChurnOp::Free(next(&mut state) as usize)
            }
        })
        .collect()
}
