//! Byte patterns for checking that block contents survive.
//!
//! Each pattern depends on a seed and the byte position, so a block that
//! was moved, truncated or overlapped by a neighbour shows up as a
//! mismatch instead of a coincidental match.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::slice;

/// Byte at position `index` of the pattern for `seed`.
pub fn pattern_byte(seed: u8, index: usize) -> u8 {
    seed.wrapping_mul(31).wrapping_add(index as u8).wrapping_add((index >> 8) as u8)
}

/// `len` bytes of the pattern for `seed`.
pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| pattern_byte(seed, i)).collect()
}

/// Write the pattern for `seed` into `len` bytes at `ptr`.
///
/// # Safety
///
/// `ptr` must be valid for `len` bytes of writes.
pub unsafe fn fill_pattern(ptr: NonNull<u8>, len: usize, seed: u8) {
    // SAFETY: caller guarantees `len` writable bytes.
    let bytes = unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) };
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = pattern_byte(seed, i);
    }
}

/// Whether the `len` bytes at `ptr` hold the pattern for `seed`.
///
/// # Safety
///
/// `ptr` must be valid for `len` bytes of reads.
pub unsafe fn check_pattern(ptr: NonNull<u8>, len: usize, seed: u8) -> bool {
    // SAFETY: caller guarantees `len` readable bytes.
    let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), len) };
    bytes
        .iter()
        .enumerate()
        .all(|(i, &byte)| byte == pattern_byte(seed, i))
}

/// Sizes that straddle alignment and page boundaries.
pub const AWKWARD_SIZES: &[usize] = &[0, 1, 15, 16, 17, 31, 33, 255, 4095, 4096, 4097, 8192];
