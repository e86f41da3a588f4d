//! Integration tests for the `arena_pool` package.
//!
//! These tests drive the slot and block pool families through their public APIs,
//! covering growth across arenas, pointer stability, reuse after release, and
//! uniform access through `RawPool`.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::alloc::Layout;
use std::num::NonZero;
use std::thread;

use arena_pool::{BlockArena, BlockPool, RawPool, SlotPool, SlotSlab};
use new_zealand::nz;

#[test]
fn slot_pool_round_trips_many_items() {
    let mut pool = SlotPool::builder().layout_of::<u64>().build();

    let slots: Vec<_> = (0..1000)
        .map(|_| pool.allocate(nz!(1)).expect("the pool grows on demand"))
        .collect();

    assert_eq!(pool.len(), 1000);

    for (index, slot) in slots.iter().enumerate() {
        let value = u64::try_from(index).unwrap();
        unsafe { slot.cast::<u64>().write(value) };
    }

    for (index, slot) in slots.iter().enumerate() {
        let value = u64::try_from(index).unwrap();
        assert_eq!(unsafe { slot.cast::<u64>().read() }, value);
    }

    for slot in slots {
        unsafe { pool.deallocate(slot, nz!(1)) };
    }

    assert!(pool.is_empty());
}

#[test]
fn slot_pool_runs_are_contiguous() {
    let mut pool = SlotPool::builder().layout_of::<u64>().build();

    let run = pool.allocate(nz!(4)).expect("the pool grows on demand");

    for index in 0..4 {
        unsafe { run.cast::<u64>().add(index).write(1000 + u64::try_from(index).unwrap()) };
    }

    for index in 0..4 {
        let expected = 1000 + u64::try_from(index).unwrap();
        assert_eq!(unsafe { run.cast::<u64>().add(index).read() }, expected);
    }

    unsafe { pool.deallocate(run, nz!(4)) };
}

#[test]
fn block_pool_serves_variable_runs() {
    let mut pool = BlockPool::builder()
        .layout_of::<u64>()
        .initial_capacity(nz!(4))
        .build();

    let runs: Vec<_> = (1..=8_usize)
        .map(|length| {
            let count = NonZero::new(length).unwrap();
            let run = pool.allocate(count).expect("the pool grows on demand");

            for index in 0..length {
                let value = u64::try_from(length * 100 + index).unwrap();
                unsafe { run.cast::<u64>().add(index).write(value) };
            }

            (run, length)
        })
        .collect();

    assert_eq!(pool.len(), 8);

    // Releasing the even-length runs leaves the odd ones untouched.
    for &(run, length) in &runs {
        if length % 2 == 0 {
            unsafe { pool.deallocate(run) };
        }
    }

    let extra = pool.allocate(nz!(5)).expect("the pool grows on demand");

    for &(run, length) in &runs {
        if length % 2 == 1 {
            for index in 0..length {
                let expected = u64::try_from(length * 100 + index).unwrap();
                assert_eq!(unsafe { run.cast::<u64>().add(index).read() }, expected);
            }
        }
    }

    unsafe { pool.deallocate(extra) };
    for &(run, length) in &runs {
        if length % 2 == 1 {
            unsafe { pool.deallocate(run) };
        }
    }

    assert!(pool.is_empty());
}

#[test]
fn slot_slab_reuses_released_slots() {
    let mut slab = SlotSlab::builder().layout_of::<u64>().capacity(nz!(8)).build();

    let mut slots: Vec<_> = (0..8)
        .map(|_| slab.allocate(nz!(1)).expect("the slab has capacity for eight items"))
        .collect();

    // The slab is full; there is nowhere left to grow.
    assert!(slab.allocate(nz!(1)).is_none());

    let released = slots.swap_remove(3);
    unsafe { slab.deallocate(released, nz!(1)) };

    let reused = slab.allocate(nz!(1)).expect("one slot was just released");
    assert_eq!(reused, released);

    unsafe { slab.deallocate(reused, nz!(1)) };
    for slot in slots {
        unsafe { slab.deallocate(slot, nz!(1)) };
    }
}

#[test]
fn block_arena_reclaims_fragments_for_large_runs() {
    let mut arena = BlockArena::builder()
        .layout_of::<[u8; 16]>()
        .capacity(nz!(4))
        .build();

    let singles: Vec<_> = (0..4)
        .map(|_| arena.allocate(nz!(1)).expect("the arena has capacity for four items"))
        .collect();

    assert!(arena.allocate(nz!(1)).is_none());

    for single in singles {
        unsafe { arena.deallocate(single) };
    }

    // The four single-item fragments merge back into storage for a four-item run.
    let long = arena.allocate(nz!(4)).expect("the whole arena is free again");
    let short = arena.allocate(nz!(1)).expect("the remainder holds one more item");

    assert_eq!(arena.len(), 2);

    unsafe { arena.deallocate(long) };
    unsafe { arena.deallocate(short) };
    assert!(arena.is_empty());
}

#[test]
fn raw_pool_gives_uniform_access() {
    fn exercise(pool: &mut dyn RawPool) {
        assert_eq!(pool.item_layout(), Layout::new::<u64>());

        let first = pool.allocate(nz!(1)).expect("all pool kinds have room for this");
        let second = pool.allocate(nz!(2)).expect("all pool kinds have room for this");

        assert!(pool.contains(first));
        assert!(pool.contains(second));
        assert!(!pool.is_empty());

        unsafe { pool.deallocate(first, nz!(1)) };
        unsafe { pool.deallocate(second, nz!(2)) };

        assert!(pool.is_empty());
    }

    exercise(&mut SlotSlab::builder().layout_of::<u64>().capacity(nz!(8)).build());
    exercise(&mut SlotPool::builder().layout_of::<u64>().build());
    exercise(&mut BlockArena::builder().layout_of::<u64>().capacity(nz!(8)).build());
    exercise(&mut BlockPool::builder().layout_of::<u64>().build());
}

#[test]
fn pools_move_between_threads() {
    let mut slot_pool = SlotPool::builder().layout_of::<u64>().build();
    let mut block_pool = BlockPool::builder().layout_of::<u64>().build();

    let value = thread::spawn(move || {
        let slot = slot_pool.allocate(nz!(1)).expect("the pool grows on demand");
        let run = block_pool.allocate(nz!(3)).expect("the pool grows on demand");

        unsafe { slot.cast::<u64>().write(42) };
        let value = unsafe { slot.cast::<u64>().read() };

        unsafe { slot_pool.deallocate(slot, nz!(1)) };
        unsafe { block_pool.deallocate(run) };

        value
    })
    .join()
    .unwrap();

    assert_eq!(value, 42);
}

#[test]
fn different_types_can_share_a_layout() {
    let mut pool = SlotPool::builder().layout_of::<u64>().build();

    let unsigned = pool.allocate(nz!(1)).expect("the pool grows on demand");
    let signed = pool.allocate(nz!(1)).expect("the pool grows on demand");

    unsafe { unsigned.cast::<u64>().write(42) };
    unsafe { signed.cast::<i64>().write(-123) };

    assert_eq!(unsafe { unsigned.cast::<u64>().read() }, 42);
    assert_eq!(unsafe { signed.cast::<i64>().read() }, -123);

    unsafe { pool.deallocate(unsigned, nz!(1)) };
    unsafe { pool.deallocate(signed, nz!(1)) };
}

#[test]
fn pointers_stay_valid_while_pools_grow() {
    let mut pool = BlockPool::builder()
        .layout_of::<u64>()
        .initial_capacity(nz!(1))
        .build();

    let stable = pool.allocate(nz!(1)).expect("the pool grows on demand");
    unsafe { stable.cast::<u64>().write(7777) };

    let later: Vec<_> = (0..50)
        .map(|_| pool.allocate(nz!(1)).expect("the pool grows on demand"))
        .collect();

    assert!(pool.arena_count() > 1);
    assert!(pool.contains(stable));
    assert_eq!(unsafe { stable.cast::<u64>().read() }, 7777);

    unsafe { pool.deallocate(stable) };
    for run in later {
        unsafe { pool.deallocate(run) };
    }
}
