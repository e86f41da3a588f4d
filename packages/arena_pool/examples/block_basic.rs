//! Basic usage example for `BlockPool`.
//!
//! This example demonstrates how to use `BlockPool` to manage variable-length runs
//! of items, with release-order reuse and growth that always fits the request.

use arena_pool::BlockPool;
use new_zealand::nz;

fn main() {
    // Create a pool for u64 values.
    let mut pool = BlockPool::builder()
        .layout_of::<u64>()
        .initial_capacity(nz!(4))
        .build();

    println!("Created BlockPool with initial capacity: {}", pool.initial_capacity());

    // Fill the first arena with single-item runs.
    let mut singles = Vec::new();
    for index in 0..4_u64 {
        let run = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");

        // SAFETY: The run holds storage for one u64.
        unsafe { run.cast::<u64>().write(index) };

        singles.push(run);
    }

    println!(
        "Reserved {} blocks in {} arena(s) spanning {} bytes",
        pool.len(),
        pool.arena_count(),
        pool.byte_capacity()
    );

    // Released storage is recycled before the pool grows.
    let released = singles.swap_remove(1);
    // SAFETY: The run came from this pool and is released once.
    unsafe { pool.deallocate(released) };

    let recycled = pool.allocate(nz!(1)).expect("a block was just released");
    assert_eq!(recycled, released);
    println!("Released block was handed out again at {recycled:p}");

    // The arena is full again, so a four-item run brings a second arena.
    let quartet = pool.allocate(nz!(4)).expect("the pool grows until memory runs out");

    for index in 0..4 {
        let value = u64::try_from(index).unwrap();

        // SAFETY: The run holds four u64 items and `index` stays in bounds.
        unsafe { quartet.cast::<u64>().add(index).write(value) };
    }

    println!(
        "After a 4-item run the pool spans {} bytes in {} arena(s)",
        pool.byte_capacity(),
        pool.arena_count()
    );

    // A request larger than any arena simply brings one that fits it.
    let long = pool.allocate(nz!(40)).expect("the pool grows until memory runs out");

    println!(
        "After a 40-item run the pool spans {} bytes in {} arena(s)",
        pool.byte_capacity(),
        pool.arena_count()
    );

    // Values written before all that growth are untouched.
    let oldest = *singles.first().expect("four runs were reserved above");

    // SAFETY: The run was initialized above and stays reserved.
    let first_value = unsafe { oldest.cast::<u64>().read() };
    assert_eq!(first_value, 0);
    println!("Pointers handed out before growth are still valid");

    // Every reservation is returned before the pool is dropped.
    for run in singles {
        // SAFETY: Each run came from this pool and is released once.
        unsafe { pool.deallocate(run) };
    }
    // SAFETY: Same as above.
    unsafe { pool.deallocate(recycled) };
    // SAFETY: Same as above.
    unsafe { pool.deallocate(quartet) };
    // SAFETY: Same as above.
    unsafe { pool.deallocate(long) };

    assert!(pool.is_empty());
    println!("BlockPool example completed successfully!");
}
