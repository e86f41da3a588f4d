//! Basic benchmarks for the slot pool family.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::ptr::NonNull;
use std::time::Instant;

use alloc_tracker::Allocator;
use arena_pool::SlotPool;
use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("slot_basic");

    let allocs_op = allocs.operation("build_empty");
    group.bench_function("build_empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                // No slab exists until the first allocation, so this measures only
                // the bookkeeping shell.
                drop(black_box(SlotPool::builder().layout_of::<TestItem>().build()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("allocate_one");
    group.bench_function("allocate_one", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| SlotPool::builder().layout_of::<TestItem>().build())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let mut slots = Vec::with_capacity(pools.len());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                slots.push(black_box(pool.allocate(nz!(1)).unwrap()));
            }

            let elapsed = start.elapsed();

            for (pool, slot) in pools.iter_mut().zip(slots) {
                // SAFETY: Each slot came from its own pool and is released once.
                unsafe { pool.deallocate(slot, nz!(1)) };
            }

            elapsed
        });
    });

    let allocs_op = allocs.operation("read_one");
    group.bench_function("read_one", |b| {
        b.iter_custom(|iters| {
            let mut pool = SlotPool::builder().layout_of::<TestItem>().build();

            let slot = pool.allocate(nz!(1)).unwrap();

            // SAFETY: The slot holds storage for one TestItem.
            unsafe { slot.cast::<TestItem>().write(TEST_VALUE) };

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                // SAFETY: The slot was initialized above and stays reserved.
                _ = black_box(unsafe { slot.cast::<TestItem>().read() });
            }

            let elapsed = start.elapsed();

            // SAFETY: The slot came from this pool and is released once.
            unsafe { pool.deallocate(slot, nz!(1)) };

            elapsed
        });
    });

    let allocs_op = allocs.operation("release_one");
    group.bench_function("release_one", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| SlotPool::builder().layout_of::<TestItem>().build())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let slots = pools
                .iter_mut()
                .map(|pool| pool.allocate(nz!(1)).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for (pool, slot) in pools.iter_mut().zip(slots) {
                // SAFETY: Each slot came from its own pool and is released once.
                unsafe { pool.deallocate(slot, nz!(1)) };
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("slot_slow");

    let allocs_op = allocs.operation("allocate_10k");
    group.bench_function("allocate_10k", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| SlotPool::builder().layout_of::<TestItem>().build())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let mut slot_sets = pools
                .iter()
                .map(|_| Vec::with_capacity(10_000))
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for (pool, slots) in pools.iter_mut().zip(slot_sets.iter_mut()) {
                for _ in 0..10_000 {
                    slots.push(black_box(pool.allocate(nz!(1)).unwrap()));
                }
            }

            let elapsed = start.elapsed();

            for (pool, slots) in pools.iter_mut().zip(slot_sets.iter_mut()) {
                for slot in slots.drain(..) {
                    // SAFETY: Each slot came from its own pool and is released once.
                    unsafe { pool.deallocate(slot, nz!(1)) };
                }
            }

            elapsed
        });
    });

    let allocs_op = allocs.operation("forward_10_back_5_times_1000");
    group.bench_function("forward_10_back_5_times_1000", |b| {
        // We reserve 10 slots, release the first 5 and repeat this 1000 times.
        // This can stress the scan position and bitmap aspects of the pool.
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| SlotPool::builder().layout_of::<TestItem>().build())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let mut kept_sets = pools
                .iter()
                .map(|_| Vec::with_capacity(5000))
                .collect::<Vec<Vec<NonNull<u8>>>>();

            let mut to_release = Vec::with_capacity(5);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for (pool, kept) in pools.iter_mut().zip(kept_sets.iter_mut()) {
                for _ in 0..1000 {
                    to_release.clear();

                    // Reserve the 5 that we will release right away.
                    for _ in 0..5 {
                        to_release.push(pool.allocate(nz!(1)).unwrap());
                    }

                    // Reserve the 5 that we will keep.
                    for _ in 0..5 {
                        kept.push(black_box(pool.allocate(nz!(1)).unwrap()));
                    }

                    #[expect(clippy::iter_with_drain, reason = "to avoid moving the value")]
                    for slot in to_release.drain(..) {
                        // SAFETY: Each slot came from this pool and is released once.
                        unsafe { pool.deallocate(slot, nz!(1)) };
                    }
                }
            }

            let elapsed = start.elapsed();

            for (pool, kept) in pools.iter_mut().zip(kept_sets.iter_mut()) {
                for slot in kept.drain(..) {
                    // SAFETY: Each slot came from this pool and is released once.
                    unsafe { pool.deallocate(slot, nz!(1)) };
                }
            }

            elapsed
        });
    });

    let allocs_op = allocs.operation("release_10k");
    group.bench_function("release_10k", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| SlotPool::builder().layout_of::<TestItem>().build())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let slot_sets = pools
                .iter_mut()
                .map(|pool| {
                    iter::repeat_with(|| pool.allocate(nz!(1)).unwrap())
                        .take(10_000)
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for (pool, slots) in pools.iter_mut().zip(slot_sets) {
                for slot in slots {
                    // SAFETY: Each slot came from its own pool and is released once.
                    unsafe { pool.deallocate(slot, nz!(1)) };
                }
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
