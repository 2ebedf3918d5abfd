//! Integration test: bulk release through the smart allocator.
//!
//! For every block count the smart allocator must hand back exactly the
//! blocks it took from its parent, plus its own table, whether released by
//! `clear`, `free` or drop. The parent is a ledger-keeping `CountingMem`,
//! so a leak or a double release shows up as an unbalanced ledger.

use bedrock_alloc::{AllocError, Arena, Heap, Mem, SmartConfig, SmartMem};
use bedrock_test_utils::fixtures::{check_pattern, fill_pattern};
use bedrock_test_utils::CountingMem;

const COUNTS: [usize; 4] = [0, 1, 17, 1000];

fn allocate_n(smart: &SmartMem<'_>, n: usize) {
    for i in 0..n {
        let size = 8 + (i % 13) * 24;
        let ptr = smart.allocate(size).unwrap();
        unsafe { fill_pattern(ptr, size, i as u8) };
    }
}

#[test]
fn free_returns_every_block() {
    for n in COUNTS {
        let parent = CountingMem::system();
        let smart = SmartMem::new(&parent);
        allocate_n(&smart, n);
        assert_eq!(smart.live(), n);
        let table = usize::from(n > 0);
        assert_eq!(parent.live_blocks(), n + table, "n = {n}");
        smart.free();
        assert!(parent.is_balanced(), "n = {n}");
        assert_eq!(parent.allocations(), parent.deallocations());
    }
}

#[test]
fn drop_returns_every_block() {
    for n in COUNTS {
        let parent = CountingMem::system();
        {
            let smart = SmartMem::new(&parent);
            allocate_n(&smart, n);
        }
        assert!(parent.is_balanced(), "n = {n}");
    }
}

#[test]
fn clear_keeps_only_the_table() {
    for n in COUNTS {
        let parent = CountingMem::system();
        let mut smart = SmartMem::new(&parent);
        allocate_n(&smart, n);
        let capacity = smart.capacity();
        smart.clear();
        assert_eq!(smart.live(), 0);
        assert_eq!(smart.capacity(), capacity);
        assert_eq!(parent.live_blocks(), usize::from(capacity > 0), "n = {n}");
        allocate_n(&smart, n);
        assert_eq!(smart.capacity(), capacity, "table is reused");
        drop(smart);
        assert!(parent.is_balanced(), "n = {n}");
    }
}

#[test]
fn clear_then_free_releases_nothing_twice() {
    for n in COUNTS {
        let parent = CountingMem::system();
        let mut smart = SmartMem::new(&parent);
        allocate_n(&smart, n);
        smart.clear();
        let released = parent.deallocations();
        assert_eq!(released, n, "n = {n}");
        smart.free();
        assert_eq!(parent.deallocations(), released + usize::from(n > 0));
        assert_eq!(parent.unmatched(), 0, "n = {n}");
        assert!(parent.is_balanced(), "n = {n}");
    }
}

#[test]
fn individually_freed_blocks_are_not_released_twice() {
    let parent = CountingMem::system();
    let smart = SmartMem::new(&parent);
    let blocks: Vec<_> = (0..17).map(|_| smart.allocate(32).unwrap()).collect();
    for &ptr in blocks.iter().step_by(2) {
        unsafe { smart.deallocate(ptr) };
    }
    assert_eq!(smart.live(), 8);
    drop(smart);
    assert!(parent.is_balanced());
    assert_eq!(parent.unmatched(), 0);
}

#[test]
fn reallocated_blocks_are_released_at_their_new_address() {
    let parent = CountingMem::system();
    let smart = SmartMem::new(&parent);
    let p = smart.allocate(16).unwrap();
    unsafe { fill_pattern(p, 16, 3) };
    let q = unsafe { smart.reallocate(Some(p), 4096) }.unwrap();
    assert!(unsafe { check_pattern(q, 16, 3) });
    assert!(parent.is_live(q));
    drop(smart);
    assert!(parent.is_balanced());
}

#[test]
fn table_full_takes_nothing_from_parent() {
    let parent = CountingMem::system();
    let config = SmartConfig {
        growth_increment: 4,
        max_blocks: 10,
    };
    let smart = SmartMem::with_config(&parent, config).unwrap();
    allocate_n(&smart, 10);
    let allocations = parent.allocations();
    assert_eq!(smart.allocate(8), Err(AllocError::TableFull { max: 10 }));
    assert_eq!(parent.allocations(), allocations);
    assert_eq!(smart.capacity(), 10);
    drop(smart);
    assert!(parent.is_balanced());
}

#[test]
fn smart_over_heap_leaves_heap_empty() {
    let mut heap = Heap::with_capacity(1 << 22).unwrap();
    {
        let mem = heap.as_mem();
        let smart = SmartMem::new(&mem);
        allocate_n(&smart, 1000);
        assert!(mem.stats().used_bytes > 0);
    }
    let stats = heap.stats();
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.blocks, stats.free_blocks);
    assert!(stats.blocks <= 1);
}

#[test]
fn smart_inside_arena_level() {
    let mut arena = Arena::with_capacity(1 << 22).unwrap();
    arena.allocate(64).unwrap();
    {
        let mut scope = arena.level();
        let mem = scope.as_mem();
        let smart = SmartMem::new(&mem);
        allocate_n(&smart, 1000);
    }
    assert_eq!(arena.allocated(), 64);
}

#[test]
fn zero_size_blocks_over_arena_track_separately() {
    let mut arena = Arena::with_capacity(1 << 16).unwrap();
    let mem = arena.as_mem();
    let smart = SmartMem::new(&mem);
    let empty = smart.allocate(0).unwrap();
    let block = smart.allocate(32).unwrap();
    assert_ne!(empty, block);
    unsafe { fill_pattern(block, 32, 7) };

    unsafe { smart.deallocate(block) };
    assert_eq!(smart.live(), 1);
    assert!(smart.is_tracked(empty));
    assert!(!smart.is_tracked(block));
}
