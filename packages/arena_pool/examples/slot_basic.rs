//! Basic usage example for `SlotPool`.
//!
//! This example demonstrates how to use `SlotPool` to manage equally sized slots
//! with dynamic capacity growth and deterministic slot reuse.

use arena_pool::SlotPool;
use new_zealand::nz;

fn main() {
    // Create a pool for u32 values.
    let mut pool = SlotPool::builder()
        .layout_of::<u32>()
        .initial_capacity(nz!(4))
        .build();

    println!("Created SlotPool with initial capacity: {}", pool.initial_capacity());

    // Reserve some slots and put values into them.
    let first = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");
    let second = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");
    let third = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");

    // SAFETY: Each slot holds storage for one u32.
    unsafe { first.cast::<u32>().write(0xdeadbeef_u32) };
    // SAFETY: Same as above.
    unsafe { second.cast::<u32>().write(0xcafebabe_u32) };
    // SAFETY: Same as above.
    unsafe { third.cast::<u32>().write(0xfeedface_u32) };

    println!("Reserved 3 slots");

    // SAFETY: The slots were initialized above and stay reserved.
    let value1 = unsafe { first.cast::<u32>().read() };
    // SAFETY: Same as above.
    let value2 = unsafe { second.cast::<u32>().read() };
    // SAFETY: Same as above.
    let value3 = unsafe { third.cast::<u32>().read() };

    println!("Value 1: {value1:#x}");
    println!("Value 2: {value2:#x}");
    println!("Value 3: {value3:#x}");

    // A multi-slot run is one contiguous region, so it can back a small array.
    let run = pool.allocate(nz!(4)).expect("the pool grows until memory runs out");

    for index in 0..4 {
        let value = u32::try_from(index).unwrap();

        // SAFETY: The run holds four u32 slots and `index` stays in bounds.
        unsafe { run.cast::<u32>().add(index).write(value) };
    }

    println!(
        "Pool now has {} reserved slots with capacity {} across {} slabs",
        pool.len(),
        pool.capacity(),
        pool.slab_count()
    );

    // Release the second slot; its storage is reused before the pool grows again.
    // SAFETY: The slot came from this pool with this count and is released once.
    unsafe { pool.deallocate(second, nz!(1)) };

    let reused = pool.allocate(nz!(1)).expect("a slot was just released");
    assert_eq!(reused, second);
    println!("Released slot was handed out again at {reused:p}");

    // The pool grows as needed, appending larger slabs while every reserved
    // pointer stays where it is.
    let mut extras = Vec::new();
    for index in 0..100_u32 {
        let slot = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");

        // SAFETY: The slot holds storage for one u32.
        unsafe { slot.cast::<u32>().write(index) };

        extras.push(slot);
    }

    println!(
        "Added 100 more items. Pool now has {} reserved slots with capacity {} across {} slabs",
        pool.len(),
        pool.capacity(),
        pool.slab_count()
    );

    // SAFETY: The first slot is still reserved and still holds its value.
    assert_eq!(unsafe { first.cast::<u32>().read() }, 0xdeadbeef_u32);
    println!("Pointers handed out before growth are still valid");

    // Every reservation is returned before the pool is dropped.
    for slot in extras {
        // SAFETY: Each slot came from this pool with this count and is released once.
        unsafe { pool.deallocate(slot, nz!(1)) };
    }
    // SAFETY: Same as above.
    unsafe { pool.deallocate(first, nz!(1)) };
    // SAFETY: Same as above.
    unsafe { pool.deallocate(third, nz!(1)) };
    // SAFETY: Same as above.
    unsafe { pool.deallocate(reused, nz!(1)) };
    // SAFETY: The run came from this pool with this count and is released once.
    unsafe { pool.deallocate(run, nz!(4)) };

    assert!(pool.is_empty());
    println!("SlotPool example completed successfully!");
}
