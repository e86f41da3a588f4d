//! Basic benchmarks for the `typed_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;
use typed_pool::{ObjectPool, PoolRegistry};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("typed_basic");

    let allocs_op = allocs.operation("build_empty");
    group.bench_function("build_empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(ObjectPool::<TestItem>::new()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("create_destroy_one");
    group.bench_function("create_destroy_one", |b| {
        b.iter_custom(|iters| {
            let mut pool = ObjectPool::<TestItem>::new();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let run = pool.create(nz!(1), &TEST_VALUE).unwrap();

                // SAFETY: The run came from this pool with this count and is
                // released once.
                unsafe { pool.destroy(black_box(run), nz!(1)) };
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("create_destroy_run_16");
    group.bench_function("create_destroy_run_16", |b| {
        b.iter_custom(|iters| {
            let mut pool = ObjectPool::<TestItem>::new();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let run = pool.create(nz!(16), &TEST_VALUE).unwrap();

                // SAFETY: The run came from this pool with this count and is
                // released once.
                unsafe { pool.destroy(black_box(run), nz!(16)) };
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("registry_allocate_release_one");
    group.bench_function("registry_allocate_release_one", |b| {
        b.iter_custom(|iters| {
            let mut registry = PoolRegistry::new();
            registry.register::<TestItem>(nz!(128));

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let slot = registry.allocate::<TestItem>(nz!(1)).unwrap();

                // SAFETY: The slot came from this registry under this type with
                // this count and is released once.
                unsafe { registry.deallocate::<TestItem>(black_box(slot), nz!(1)) };
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
