//! Integration test: every backend honours the same `Mem` contract.
//!
//! The same workload runs through `&dyn Mem` over the arena, the heap,
//! the process allocator and the smart allocator. Each must return
//! aligned, disjoint blocks, keep contents across reallocation, and report
//! the same class of error for impossible requests.

use bedrock_alloc::{
    allocate_array, AllocError, Arena, ErrorKind, Heap, Mem, MemExt, SmartMem, SystemMem,
    ALIGNMENT,
};
use bedrock_test_utils::fixtures::{check_pattern, fill_pattern, AWKWARD_SIZES};
use bedrock_test_utils::CountingMem;

// ── Workloads ────────────────────────────────────────────────────────

fn grow_and_release(mem: &dyn Mem) {
    let mut blocks = Vec::new();
    for (seed, &size) in AWKWARD_SIZES.iter().enumerate() {
        let ptr = mem.allocate(size).unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT.min(mem.alignment()), 0);
        unsafe { fill_pattern(ptr, size, seed as u8) };
        blocks.push((ptr, size, seed as u8));
    }

    for &(ptr, size, seed) in &blocks {
        assert!(unsafe { check_pattern(ptr, size, seed) }, "size {size} clobbered");
    }

    for block in blocks.iter_mut() {
        let (ptr, size, seed) = *block;
        let grown = size * 2 + 40;
        let moved = unsafe { mem.reallocate(Some(ptr), grown) }.unwrap();
        assert!(unsafe { check_pattern(moved, size, seed) }, "size {size} lost on grow");
        unsafe { fill_pattern(moved, grown, seed) };
        *block = (moved, grown, seed);
    }

    for block in blocks.iter_mut() {
        let (ptr, size, seed) = *block;
        let shrunk = size / 3;
        let moved = unsafe { mem.reallocate(Some(ptr), shrunk) }.unwrap();
        assert!(unsafe { check_pattern(moved, shrunk, seed) }, "lost on shrink");
        *block = (moved, shrunk, seed);
    }

    for &(ptr, size, seed) in blocks.iter().rev() {
        assert!(unsafe { check_pattern(ptr, size, seed) });
        unsafe { mem.deallocate(ptr) };
    }
}

fn impossible_requests(mem: &dyn Mem) {
    let err = mem.allocate(usize::MAX - 8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exhaustion);
    assert_eq!(
        mem.allocate_array_sized(usize::MAX / 4, 8).unwrap_err(),
        AllocError::SizeOverflow
    );
    assert_eq!(
        mem.allocate_array::<u64>(usize::MAX / 2).unwrap_err(),
        AllocError::SizeOverflow
    );
}

fn typed_arrays(mem: &dyn Mem) {
    let values = allocate_array::<u32, _>(mem, 100).unwrap();
    let slice = unsafe { std::slice::from_raw_parts_mut(values.as_ptr(), 100) };
    assert!(slice.iter().all(|&v| v == 0));
    for (i, v) in slice.iter_mut().enumerate() {
        *v = i as u32 * 3;
    }
    assert_eq!(slice[99], 297);
    unsafe { mem.deallocate(values.cast()) };
}

fn run_all(mem: &dyn Mem) {
    grow_and_release(mem);
    impossible_requests(mem);
    typed_arrays(mem);
}

// ── Backends ─────────────────────────────────────────────────────────

#[test]
fn arena_backend() {
    let mut arena = Arena::with_capacity(1 << 24).unwrap();
    run_all(&arena.as_mem());
}

#[test]
fn heap_backend() {
    let mut heap = Heap::with_capacity(1 << 24).unwrap();
    run_all(&heap.as_mem());
    assert_eq!(heap.stats().used_bytes, 0);
}

#[test]
fn system_backend() {
    let counting = CountingMem::new(SystemMem::new());
    run_all(&counting);
    assert!(counting.is_balanced());
}

#[test]
fn smart_over_system_backend() {
    let parent = CountingMem::system();
    {
        let smart = SmartMem::new(&parent);
        run_all(&smart);
        assert_eq!(smart.live(), 0);
    }
    assert!(parent.is_balanced());
}

#[test]
fn smart_over_heap_backend() {
    let mut heap = Heap::with_capacity(1 << 24).unwrap();
    {
        let mem = heap.as_mem();
        let smart = SmartMem::new(&mem);
        run_all(&smart);
    }
    assert_eq!(heap.stats().used_bytes, 0);
}

#[test]
fn backends_share_alignment_guarantee() {
    let mut arena = Arena::with_capacity(1 << 16).unwrap();
    let mut heap = Heap::with_capacity(1 << 16).unwrap();
    let arena_mem = arena.as_mem();
    let heap_mem = heap.as_mem();
    let system = SystemMem::new();
    let backends: [&dyn Mem; 3] = [&arena_mem, &heap_mem, &system];
    for mem in backends {
        assert!(mem.alignment() >= 2 * std::mem::size_of::<usize>());
        for size in [1, 3, 17, 100] {
            let ptr = mem.allocate(size).unwrap();
            assert_eq!(ptr.as_ptr() as usize % mem.alignment(), 0);
            unsafe { mem.deallocate(ptr) };
        }
    }
}
