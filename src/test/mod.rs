use crate::constants::{CHUNK_SIZE, LARGE_OBJECT_HEADER_SIZE, PAGE_SIZE};
use crate::{
    Address, AllocError, Allocator, Corruption, LinearMemory, MemoryConfig, SizeClass, VecMemory,
};

fn heap() -> Allocator<VecMemory> {
    Allocator::new(VecMemory::new(MemoryConfig::default()).unwrap())
}

fn heap_with(initial_pages: usize, maximum_pages: usize) -> Allocator<VecMemory> {
    let config = MemoryConfig {
        initial_pages,
        maximum_pages,
        heap_base: 0,
    };

    Allocator::new(VecMemory::new(config).unwrap())
}

fn alloc(heap: &mut Allocator<VecMemory>, size: usize) -> Address {
    heap.allocate(size).unwrap().unwrap()
}

fn addr(raw: usize) -> Address {
    Address::new(raw).unwrap()
}

#[test]
fn zero_sized_requests_allocate_nothing() {
    let mut heap = heap();

    assert_eq!(heap.allocate(0), Ok(None));
    assert_eq!(heap.malloc(0), 0);
    heap.free(0);

    assert_eq!(heap.stats().allocations, 0);
    assert_eq!(heap.stats().granted_bytes, 0);
}

#[test]
fn freed_small_slots_are_reused_lifo() {
    let mut heap = heap();

    let addrs: Vec<Address> = (0..5).map(|_| alloc(&mut heap, 8)).collect();
    heap.deallocate(addrs[1]).unwrap();
    heap.deallocate(addrs[3]).unwrap();

    assert_eq!(alloc(&mut heap, 8), addrs[3]);
    assert_eq!(alloc(&mut heap, 8), addrs[1]);
    assert_eq!(heap.stats().small_refills, 1);
}

#[test]
fn every_small_size_round_trips_without_growth() {
    let mut heap = heap();

    for size in 1..=256 {
        let a = alloc(&mut heap, size);
        assert_eq!(a.get() % 8, 0);
        assert!(heap.usable_size(a).unwrap() >= size);

        heap.deallocate(a).unwrap();
        assert_eq!(alloc(&mut heap, size), a, "size {}", size);
        heap.deallocate(a).unwrap();
    }

    let stats = heap.stats();
    assert_eq!(stats.grow_requests, 0);
    assert_eq!(stats.small_refills, 32);
    assert_eq!(stats.live_allocations(), 0);
    heap.check_integrity().unwrap();
}

#[test]
fn small_slots_round_up_to_granules() {
    let mut heap = heap();

    for (size, usable) in [(1, 8), (8, 8), (9, 16), (100, 104), (250, 256), (256, 256)] {
        let a = alloc(&mut heap, size);
        assert_eq!(heap.usable_size(a), Ok(usable));
        assert_eq!(heap.payload(a).unwrap().len(), usable);
    }
}

#[test]
fn large_objects_are_chunk_aligned() {
    let mut heap = heap();
    let sizes = [257, 300, 1000, 4096, 20000, PAGE_SIZE, 2 * PAGE_SIZE];

    let addrs: Vec<Address> = sizes.iter().map(|&size| alloc(&mut heap, size)).collect();

    for (&size, &a) in sizes.iter().zip(&addrs) {
        assert_eq!((a.get() - LARGE_OBJECT_HEADER_SIZE) % CHUNK_SIZE, 0);
        assert!(heap.usable_size(a).unwrap() >= size, "size {}", size);
    }
    heap.check_integrity().unwrap();

    for a in addrs {
        heap.deallocate(a).unwrap();
    }
    heap.check_integrity().unwrap();
    assert_eq!(heap.stats().live_allocations(), 0);
}

#[test]
fn freed_large_object_is_reused_by_best_fit() {
    let mut heap = heap();

    let first = alloc(&mut heap, 300);
    let _second = alloc(&mut heap, 300);
    heap.deallocate(first).unwrap();
    let granted = heap.stats().granted_bytes;

    // the 256 byte class carves its chunk out of the freed object
    let reused = alloc(&mut heap, 250);

    assert_eq!(reused.get(), first.get() - LARGE_OBJECT_HEADER_SIZE);
    assert_eq!(heap.stats().granted_bytes, granted);
    assert_eq!(heap.stats().grow_requests, 0);
}

#[test]
fn freed_large_object_is_reused_for_the_same_size() {
    let mut heap = heap();

    let a = alloc(&mut heap, 5000);
    let _b = alloc(&mut heap, 5000);
    heap.deallocate(a).unwrap();

    assert_eq!(alloc(&mut heap, 4500), a);
    heap.check_integrity().unwrap();
}

#[test]
fn round_trips_do_not_grow_the_heap() {
    let mut heap = heap();

    for size in [16, 300, 2000, 256, 40000] {
        let a = alloc(&mut heap, size);
        heap.deallocate(a).unwrap();
    }
    let granted = heap.stats().granted_bytes;

    for _ in 0..100 {
        for size in [16, 300, 2000, 256, 40000] {
            let a = alloc(&mut heap, size);
            heap.deallocate(a).unwrap();
        }
    }

    assert_eq!(heap.stats().granted_bytes, granted);
}

#[test]
fn first_allocation_uses_preallocated_memory() {
    let mut heap = heap();

    let a = alloc(&mut heap, 1000);

    // heap base 1024 rounds up to the second page
    assert_eq!(a.get(), PAGE_SIZE + CHUNK_SIZE + LARGE_OBJECT_HEADER_SIZE);
    assert_eq!(heap.stats().granted_bytes, PAGE_SIZE);
    assert_eq!(heap.stats().memory_pages, 2);
    assert_eq!(heap.memory().grow_calls(), 0);
}

#[test]
fn growth_stays_within_the_heap() {
    let mut heap = heap();

    let a = alloc(&mut heap, 3 * PAGE_SIZE);
    let stats = heap.stats();

    assert_eq!(stats.grow_requests, 1);
    // the preallocated page plus three more, grown in one step
    assert_eq!(stats.memory_pages, 5);
    assert_eq!(stats.granted_bytes, 4 * PAGE_SIZE);
    assert!(a.get() + heap.usable_size(a).unwrap() <= heap.memory().size());
}

#[test]
fn refused_growth_is_reported() {
    let mut heap = heap_with(1, 1);

    assert_eq!(
        heap.allocate(PAGE_SIZE),
        Err(AllocError::OutOfMemory {
            requested: PAGE_SIZE + LARGE_OBJECT_HEADER_SIZE
        })
    );
    assert_eq!(heap.memory().out_of_memory_calls(), 1);
    assert_eq!(heap.malloc(PAGE_SIZE), 0);
    assert_eq!(heap.memory().out_of_memory_calls(), 2);

    let stats = heap.stats();
    assert_eq!(stats.refused_grow_requests, 2);
    assert_eq!(stats.allocations, 0);

    // smaller requests still fit in what is there
    assert_ne!(heap.malloc(64), 0);
    assert!(!AllocError::OutOfMemory { requested: 1 }.is_fatal());
}

#[test]
fn small_objects_exhaust_memory() {
    let mut heap = heap_with(1, 1);
    let mut count = 0;

    while heap.malloc(256) != 0 {
        count += 1;
    }

    // one chunk per 256 byte slot, minus the page header
    assert_eq!(count, PAGE_SIZE / CHUNK_SIZE - 1);
    assert_eq!(heap.memory().out_of_memory_calls(), 1);
    heap.check_integrity().unwrap();
}

#[test]
fn invalid_frees_are_fatal() {
    let mut heap = heap();
    let large = alloc(&mut heap, 300);
    let small = alloc(&mut heap, 16);

    let cases = [
        (512, "below heap base"),
        (8 * PAGE_SIZE, "beyond memory"),
        (PAGE_SIZE + 16, "in a page header"),
        (PAGE_SIZE + 8 * CHUNK_SIZE + 8, "in a free chunk"),
        (large.get() + 8, "inside a large object"),
        (small.get() + 8, "inside a small slot"),
    ];

    for (raw, what) in cases {
        let err = heap.deallocate(addr(raw)).unwrap_err();
        assert!(err.is_fatal(), "{}: {:?}", what, err);
    }

    assert!(matches!(
        heap.deallocate(addr(512)),
        Err(AllocError::Corrupted(Corruption::BelowHeapBase { .. }))
    ));
    assert!(matches!(
        heap.deallocate(addr(PAGE_SIZE + 16)),
        Err(AllocError::Corrupted(Corruption::InPageHeader { .. }))
    ));
    assert!(matches!(
        heap.deallocate(addr(small.get() + 8)),
        Err(AllocError::Corrupted(Corruption::NotASlot { .. }))
    ));
    assert!(matches!(
        heap.deallocate(addr(PAGE_SIZE + 8 * CHUNK_SIZE + 8)),
        Err(AllocError::Corrupted(Corruption::UnknownChunkKind { kind: 0, .. }))
    ));

    assert_eq!(heap.stats().deallocations, 0);
    heap.check_integrity().unwrap();
}

#[test]
#[should_panic]
fn free_panics_on_a_foreign_pointer() {
    let mut heap = heap();
    heap.malloc(8);

    heap.free((PAGE_SIZE + 16) as u32);
}

#[test]
fn payload_writes_leave_metadata_alone() {
    let mut heap = heap();
    let mut live = vec![];

    for size in [8, 24, 256, 300, 1024, 5000, 8, 24, 256] {
        let a = alloc(&mut heap, size);
        heap.payload_mut(a).unwrap().fill(0xff);
        live.push(a);
    }
    heap.check_integrity().unwrap();

    for a in live.iter().step_by(2) {
        heap.deallocate(*a).unwrap();
    }
    heap.check_integrity().unwrap();

    for a in live.iter().skip(1).step_by(2) {
        assert!(heap.payload(*a).unwrap().iter().all(|&b| b == 0xff));
        heap.deallocate(*a).unwrap();
    }
    heap.check_integrity().unwrap();
}

#[test]
fn stats_count_operations() {
    let mut heap = heap();

    let a = alloc(&mut heap, 10);
    let b = alloc(&mut heap, 1000);
    heap.deallocate(a).unwrap();

    let stats = heap.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(stats.live_allocations(), 1);
    assert_eq!(stats.small_refills, 1);
    let class = SizeClass::for_size(10).unwrap();
    assert_eq!(heap.small_free_count(class), Ok(16));
    assert_eq!(heap.small_free_count(SizeClass::for_size(256).unwrap()), Ok(0));

    heap.deallocate(b).unwrap();
    let free = heap.large_free_list().unwrap();
    assert_eq!(free[0].payload, b);
}
